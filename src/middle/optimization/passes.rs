use hashbrown::HashSet;

use crate::middle::{
    ir::{InstructionKind, Operand, Program, VarId},
    optimization::usage::Usage,
};

/// Ignores assignments, arithmetic and allocations whose result is never
/// read. Stores through a pointer are always kept.
pub fn eliminate_dead_assignments(program: &mut Program) -> usize {
    let usage = Usage::analyze(program);
    let mut changes = 0;

    for instruction in program.instructions.iter_mut().filter(|i| !i.ignore) {
        let target = match instruction.kind {
            InstructionKind::Assign {
                destination: Operand::Var(v),
                ..
            }
            | InstructionKind::Arithmetic { destination: v, .. }
            | InstructionKind::Alloc { variable: v, .. } => v,
            _ => continue,
        };

        if usage[target].uses == 0 {
            instruction.ignore = true;
            changes += 1;
        }
    }

    changes
}

/// Splices the source of a single-use copy into its user, then forwards the
/// destination of a single-use result into the copy that immediately
/// follows it
pub fn propagate_copies(program: &mut Program) -> usize {
    let usage = Usage::analyze(program);
    let indices = program.live_indices().collect::<Vec<_>>();
    let mut changes = 0;

    for &definition in &indices {
        if !program.instructions[definition].ignore && propagate_copy(program, &usage, definition)
        {
            changes += 1;
        }
    }

    for &definition in &indices {
        if !program.instructions[definition].ignore
            && forward_destination(program, &usage, definition)
        {
            changes += 1;
        }
    }

    changes
}

/// `v := s` followed later by the only use of `v` becomes that use reading
/// `s` directly. Only done within one straight line region, and only when
/// nothing in between can change what `s` evaluates to.
fn propagate_copy(program: &mut Program, usage: &Usage, definition: usize) -> bool {
    let InstructionKind::Assign {
        destination: Operand::Var(variable),
        source,
    } = program.instructions[definition].kind
    else {
        return false;
    };

    let variable_usage = usage[variable];
    let Some(user) = variable_usage.sole_user() else {
        return false;
    };

    if variable_usage.definitions != 1
        || user <= definition
        || source.variable() == Some(variable)
        || program.instructions[user].ignore
    {
        return false;
    }

    let user_kind = &program.instructions[user].kind;

    if !user_kind.sources().contains(&&Operand::Var(variable)) {
        return false;
    }

    // Loads are only spliced into plain copies so every instruction keeps at
    // most one memory operand
    if matches!(source, Operand::Deref(_))
        && !matches!(
            user_kind,
            InstructionKind::Assign {
                destination: Operand::Var(_),
                ..
            }
        )
    {
        return false;
    }

    for between in definition + 1..user {
        let instruction = &program.instructions[between];

        if instruction.ignore {
            continue;
        }

        if instruction.kind.is_entry_point() {
            return false;
        }

        if source.variable().is_some()
            && instruction.kind.defined_variable() == source.variable()
        {
            return false;
        }

        if matches!(source, Operand::Deref(_)) && instruction.kind.writes_memory() {
            return false;
        }
    }

    for operand in program.instructions[user].kind.sources_mut() {
        if *operand == Operand::Var(variable) {
            *operand = source;
        }
    }

    program.instructions[definition].ignore = true;
    true
}

/// `t := e` whose only use is an immediately following `x := t` becomes
/// `x := e`
fn forward_destination(program: &mut Program, usage: &Usage, definition: usize) -> bool {
    let Some(temporary) = program.instructions[definition].kind.defined_variable() else {
        return false;
    };

    if matches!(
        program.instructions[definition].kind,
        InstructionKind::Alloc { .. } | InstructionKind::Param(_)
    ) {
        return false;
    }

    let temporary_usage = usage[temporary];
    let Some(user) = temporary_usage.sole_user() else {
        return false;
    };

    if temporary_usage.definitions != 1 || program.next_live(definition) != Some(user) {
        return false;
    }

    let InstructionKind::Assign {
        destination: Operand::Var(target),
        source: Operand::Var(source),
    } = program.instructions[user].kind
    else {
        return false;
    };

    if source != temporary || target == temporary {
        return false;
    }

    set_destination(&mut program.instructions[definition].kind, target);
    program.instructions[user].ignore = true;
    true
}

fn set_destination(kind: &mut InstructionKind, target: VarId) {
    match kind {
        InstructionKind::Assign {
            destination: Operand::Var(v),
            ..
        }
        | InstructionKind::Arithmetic { destination: v, .. }
        | InstructionKind::Call { destination: v, .. }
        | InstructionKind::Read(v) => *v = target,
        _ => {}
    }
}

/// Evaluates arithmetic and branches whose operands are both constants. A
/// branch that can never be taken is ignored.
pub fn fold_constants(program: &mut Program) -> usize {
    let mut changes = 0;

    for instruction in program.instructions.iter_mut().filter(|i| !i.ignore) {
        match instruction.kind {
            InstructionKind::Arithmetic {
                operator,
                destination,
                lhs: Operand::Const(lhs),
                rhs: Operand::Const(rhs),
            } => {
                instruction.kind = InstructionKind::Assign {
                    destination: Operand::Var(destination),
                    source: Operand::Const(operator.evaluate(lhs, rhs)),
                };
            }
            InstructionKind::Branch {
                relop,
                lhs: Operand::Const(lhs),
                rhs: Operand::Const(rhs),
                target,
            } => {
                if relop.evaluate(lhs, rhs) {
                    instruction.kind = InstructionKind::Goto(target);
                } else {
                    instruction.ignore = true;
                }
            }
            _ => continue,
        }

        changes += 1;
    }

    changes
}

/// Removes jumps and labels that do not change where control goes
pub fn clean_up_control_flow(program: &mut Program) -> usize {
    coalesce_labels(program)
        + invert_branches_over_gotos(program)
        + remove_jumps_to_next(program)
        + remove_unreachable(program)
        + remove_unreferenced_labels(program)
}

/// A run of labels becomes the first label of the run. Jumps to the later
/// ones follow the alias.
fn coalesce_labels(program: &mut Program) -> usize {
    let mut changes = 0;
    let mut previous_label = None;

    for index in program.live_indices().collect::<Vec<_>>() {
        let InstructionKind::Label(label) = program.instructions[index].kind else {
            previous_label = None;
            continue;
        };

        match previous_label {
            Some(first) => {
                program.labels[label].alias = Some(first);
                program.instructions[index].ignore = true;
                changes += 1;
            }
            None => previous_label = Some(program.resolve_label(label)),
        }
    }

    changes
}

/// `IF c GOTO T; GOTO F; LABEL T` becomes `IF !c GOTO F; LABEL T`
fn invert_branches_over_gotos(program: &mut Program) -> usize {
    let mut changes = 0;

    for index in program.live_indices().collect::<Vec<_>>() {
        let InstructionKind::Branch { target, .. } = program.instructions[index].kind else {
            continue;
        };

        let Some(jump) = program.next_live(index) else {
            continue;
        };
        let InstructionKind::Goto(otherwise) = program.instructions[jump].kind else {
            continue;
        };
        let Some(after) = program.next_live(jump) else {
            continue;
        };
        let InstructionKind::Label(label) = program.instructions[after].kind else {
            continue;
        };

        if program.resolve_label(label) != program.resolve_label(target) {
            continue;
        }

        if let InstructionKind::Branch { relop, target, .. } = &mut program.instructions[index].kind
        {
            *relop = relop.negate();
            *target = otherwise;
        }
        program.instructions[jump].ignore = true;
        changes += 1;
    }

    changes
}

/// Ignores a `GOTO` whose target is the next live instruction
fn remove_jumps_to_next(program: &mut Program) -> usize {
    let mut changes = 0;

    for index in program.live_indices().collect::<Vec<_>>() {
        let InstructionKind::Goto(target) = program.instructions[index].kind else {
            continue;
        };

        let falls_through = program.next_live(index).is_some_and(|next| {
            matches!(
                program.instructions[next].kind,
                InstructionKind::Label(label)
                    if program.resolve_label(label) == program.resolve_label(target)
            )
        });

        if falls_through {
            program.instructions[index].ignore = true;
            changes += 1;
        }
    }

    changes
}

/// Ignores everything between a `GOTO` or `RETURN` and the next label
fn remove_unreachable(program: &mut Program) -> usize {
    let mut changes = 0;
    let mut reachable = true;

    for index in program.live_indices().collect::<Vec<_>>() {
        let kind = &program.instructions[index].kind;

        if kind.is_entry_point() {
            reachable = true;
            continue;
        }

        if !reachable {
            program.instructions[index].ignore = true;
            changes += 1;
            continue;
        }

        if matches!(kind, InstructionKind::Goto(_) | InstructionKind::Return(_)) {
            reachable = false;
        }
    }

    changes
}

fn remove_unreferenced_labels(program: &mut Program) -> usize {
    let referenced = program
        .live_instructions()
        .filter_map(|i| match i.kind {
            InstructionKind::Goto(target) | InstructionKind::Branch { target, .. } => {
                Some(program.resolve_label(target))
            }
            _ => None,
        })
        .collect::<HashSet<_>>();

    let mut changes = 0;

    for index in program.live_indices().collect::<Vec<_>>() {
        if let InstructionKind::Label(label) = program.instructions[index].kind {
            if !referenced.contains(&program.resolve_label(label)) {
                program.instructions[index].ignore = true;
                changes += 1;
            }
        }
    }

    changes
}
