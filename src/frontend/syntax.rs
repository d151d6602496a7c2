//! The syntax tree handed from the parser to the analyzer. Every node carries
//! its kind, the line it starts on and an ordered list of children. Terminal
//! nodes keep their payload (identifier, literal, type keyword or relational
//! operator) inside the kind itself.

use colored::Colorize;

use crate::{frontend::intern::InternedSymbol, index::simple_index};

simple_index! {
    /// Identifies a node of the syntax tree. Used as the key of every side
    /// table the later stages build.
    pub struct NodeId;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub line: usize,
    pub children: Vec<Node>,
}

impl Node {
    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index)
    }

    /// Kind of the child at `index`, if there is one
    pub fn child_kind(&self, index: usize) -> Option<&NodeKind> {
        self.children.get(index).map(|c| &c.kind)
    }

    pub fn identifier(&self) -> Option<InternedSymbol> {
        match self.kind {
            NodeKind::Id(symbol) => Some(symbol),
            _ => None,
        }
    }

    /// Number of nodes in this subtree, including this one
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }
}

/// Primitive scalar type keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetaKind {
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Relop {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

impl Relop {
    pub fn evaluate(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Relop::Lt => lhs < rhs,
            Relop::Le => lhs <= rhs,
            Relop::Gt => lhs > rhs,
            Relop::Ge => lhs >= rhs,
            Relop::Eq => lhs == rhs,
            Relop::Ne => lhs != rhs,
        }
    }

    /// The relation that holds exactly when this one does not
    pub fn negate(self) -> Self {
        match self {
            Relop::Lt => Relop::Ge,
            Relop::Le => Relop::Gt,
            Relop::Gt => Relop::Le,
            Relop::Ge => Relop::Lt,
            Relop::Eq => Relop::Ne,
            Relop::Ne => Relop::Eq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum NodeKind {
    /* Terminals with a payload */
    Int(i32),
    Float(f32),
    Id(InternedSymbol),
    Type(MetaKind),
    Relop(Relop),

    /* Punctuation */
    Semi,
    Comma,
    AssignOp,
    Plus,
    Minus,
    Star,
    Div,
    And,
    Or,
    Not,
    Dot,
    Lp,
    Rp,
    Lb,
    Rb,
    Lc,
    Rc,

    /* Keywords */
    Struct,
    Return,
    If,
    Else,
    While,

    /* Nonterminals */
    #[strum(serialize = "Program")]
    Program,
    #[strum(serialize = "ExtDefList")]
    ExtDefList,
    #[strum(serialize = "ExtDef")]
    ExtDef,
    #[strum(serialize = "ExtDecList")]
    ExtDecList,
    #[strum(serialize = "Specifier")]
    Specifier,
    #[strum(serialize = "StructSpecifier")]
    StructSpecifier,
    #[strum(serialize = "OptTag")]
    OptTag,
    #[strum(serialize = "Tag")]
    Tag,
    #[strum(serialize = "VarDec")]
    VarDec,
    #[strum(serialize = "FunDec")]
    FunDec,
    #[strum(serialize = "VarList")]
    VarList,
    #[strum(serialize = "ParamDec")]
    ParamDec,
    #[strum(serialize = "CompSt")]
    CompSt,
    #[strum(serialize = "StmtList")]
    StmtList,
    #[strum(serialize = "Stmt")]
    Stmt,
    #[strum(serialize = "DefList")]
    DefList,
    #[strum(serialize = "Def")]
    Def,
    #[strum(serialize = "DecList")]
    DecList,
    #[strum(serialize = "Dec")]
    Dec,
    #[strum(serialize = "Exp")]
    Exp,
    #[strum(serialize = "Args")]
    Args,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            NodeKind::Program
                | NodeKind::ExtDefList
                | NodeKind::ExtDef
                | NodeKind::ExtDecList
                | NodeKind::Specifier
                | NodeKind::StructSpecifier
                | NodeKind::OptTag
                | NodeKind::Tag
                | NodeKind::VarDec
                | NodeKind::FunDec
                | NodeKind::VarList
                | NodeKind::ParamDec
                | NodeKind::CompSt
                | NodeKind::StmtList
                | NodeKind::Stmt
                | NodeKind::DefList
                | NodeKind::Def
                | NodeKind::DecList
                | NodeKind::Dec
                | NodeKind::Exp
                | NodeKind::Args
        )
    }
}

/// Renders the tree one node per line, indented two spaces per level.
/// Nonterminals show their starting line, terminals show their payload and
/// empty productions are skipped.
pub fn pretty_print_tree(root: &Node) -> String {
    let mut output = String::new();
    write_node(&mut output, root, 0);
    output
}

fn write_node(output: &mut String, node: &Node, level: usize) {
    if !node.kind.is_terminal() && node.children.is_empty() {
        return;
    }

    output.push_str(&"  ".repeat(level));

    let name = node.kind.name();
    let line = match node.kind {
        NodeKind::Id(symbol) => format!("{}: {}", name.cyan(), symbol),
        NodeKind::Type(meta) => format!("{}: {}", name.cyan(), meta.to_string().magenta()),
        NodeKind::Int(value) => format!("{}: {}", name.cyan(), value.to_string().purple()),
        NodeKind::Float(value) => format!("{}: {}", name.cyan(), format!("{value:.6}").purple()),
        NodeKind::Relop(relop) => format!("{}: {}", name.cyan(), relop),
        _ if node.kind.is_terminal() => name.cyan().to_string(),
        _ => format!("{} ({})", name, node.line),
    };

    output.push_str(&line);
    output.push('\n');

    for child in &node.children {
        write_node(output, child, level + 1);
    }
}
