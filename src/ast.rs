use std::fmt;
use std::str::FromStr;

use crate::error::FilterError;
use crate::lexer::lex;
use crate::packet::PacketView;
use crate::parser::parse;
use crate::primitive::PrimitiveToken;

/// A node of a compiled filter expression. Children are owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    And(Box<AstNode>, Box<AstNode>),
    Or(Box<AstNode>, Box<AstNode>),
    Not(Box<AstNode>),
    Leaf(PrimitiveToken),
}

impl AstNode {
    pub fn and(left: AstNode, right: AstNode) -> Self {
        AstNode::And(Box::new(left), Box::new(right))
    }
    pub fn or(left: AstNode, right: AstNode) -> Self {
        AstNode::Or(Box::new(left), Box::new(right))
    }
    /// Leaves absorb the negation, a `Not` unwraps, anything else is
    /// wrapped in a `Not`.
    pub fn negate(self) -> Self {
        match self {
            AstNode::Leaf(primitive) => AstNode::Leaf(primitive.negated_clone()),
            AstNode::Not(child) => *child,
            node => AstNode::Not(Box::new(node)),
        }
    }
    pub fn matches<P: PacketView + ?Sized>(&self, packet: &P) -> bool {
        match self {
            AstNode::And(left, right) => left.matches(packet) && right.matches(packet),
            AstNode::Or(left, right) => left.matches(packet) || right.matches(packet),
            AstNode::Not(child) => !child.matches(packet),
            AstNode::Leaf(primitive) => primitive.check(packet),
        }
    }
    pub fn leaf_count(&self) -> usize {
        match self {
            AstNode::And(left, right) | AstNode::Or(left, right) => {
                left.leaf_count() + right.leaf_count()
            }
            AstNode::Not(child) => child.leaf_count(),
            AstNode::Leaf(_) => 1,
        }
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNode::And(left, right) => write!(f, "({} and {})", left, right),
            AstNode::Or(left, right) => write!(f, "({} or {})", left, right),
            AstNode::Not(child) => match child.as_ref() {
                AstNode::Leaf(primitive) => write!(f, "{}", primitive.negated_clone()),
                _ => write!(f, "not {}", child),
            },
            AstNode::Leaf(primitive) => write!(f, "{}", primitive),
        }
    }
}

/// One compiled filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    root: AstNode,
}

impl Ast {
    pub fn new(root: AstNode) -> Self {
        Ast { root }
    }
    pub fn root(&self) -> &AstNode {
        &self.root
    }
    pub fn matches<P: PacketView + ?Sized>(&self, packet: &P) -> bool {
        self.root.matches(packet)
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl FromStr for Ast {
    type Err = FilterError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(lex(s)?)
    }
}
