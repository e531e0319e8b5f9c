use tracing::trace;

use crate::ast::Ast;
use crate::ast::AstNode;
use crate::error::FilterError;
use crate::lexer::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
enum StackItem {
    OpenParen,
    And,
    Or,
    Not,
    Node(AstNode),
}

impl StackItem {
    fn describe(&self) -> &'static str {
        match self {
            StackItem::OpenParen => "'('",
            StackItem::And => "'and'",
            StackItem::Or => "'or'",
            StackItem::Not => "'not'",
            StackItem::Node(_) => "operand",
        }
    }
}

/// Working stack of one parse. Groups are reduced as soon as their
/// closing parenthesis is pushed.
#[derive(Debug, Default)]
pub struct ParseStack {
    items: Vec<StackItem>,
}

impl ParseStack {
    pub fn new() -> Self {
        ParseStack { items: Vec::new() }
    }
    pub fn push(&mut self, token: Token) -> Result<(), FilterError> {
        let item = match token {
            Token::Primitive(primitive) => StackItem::Node(AstNode::Leaf(primitive)),
            Token::And => StackItem::And,
            Token::Or => StackItem::Or,
            Token::Not => StackItem::Not,
            Token::OpenParen => StackItem::OpenParen,
            Token::CloseParen => return self.reduce_parenthesis(),
        };
        self.items.push(item);
        Ok(())
    }
    fn reduce_parenthesis(&mut self) -> Result<(), FilterError> {
        let open = self
            .items
            .iter()
            .rposition(|item| matches!(item, StackItem::OpenParen))
            .ok_or(FilterError::UnbalancedParenthesis)?;
        let run = self.items.split_off(open + 1);
        self.items.pop();
        if run.is_empty() {
            return Err(FilterError::IncompleteFilter {
                msg: "empty parentheses".into(),
            });
        }
        let node = reduce(run)?;
        trace!("reduced group {}", node);
        self.items.push(StackItem::Node(node));
        Ok(())
    }
    /// Reduce whatever is left once the input is exhausted.
    pub fn finish(self) -> Result<Ast, FilterError> {
        if self.items.is_empty() {
            return Err(FilterError::EmptyExpression);
        }
        if self
            .items
            .iter()
            .any(|item| matches!(item, StackItem::OpenParen))
        {
            return Err(FilterError::UnbalancedParenthesis);
        }
        reduce(self.items).map(Ast::new)
    }
}

/// Fold one parenthesis-free run. `not` binds first, `and` runs fold left
/// to right, the resulting terms are joined with `or`.
fn reduce(run: Vec<StackItem>) -> Result<AstNode, FilterError> {
    let mut terms: Vec<AstNode> = Vec::new();
    let mut current: Option<AstNode> = None;
    let mut negations = 0usize;
    let mut expect_operand = true;
    for item in run {
        match item {
            StackItem::Not if expect_operand => negations += 1,
            StackItem::Node(node) if expect_operand => {
                let node = if negations % 2 == 1 { node.negate() } else { node };
                negations = 0;
                current = Some(match current.take() {
                    Some(left) => AstNode::and(left, node),
                    None => node,
                });
                expect_operand = false;
            }
            StackItem::And if !expect_operand => expect_operand = true,
            StackItem::Or if !expect_operand => {
                terms.extend(current.take());
                expect_operand = true;
            }
            StackItem::OpenParen => return Err(FilterError::UnbalancedParenthesis),
            StackItem::Node(_) | StackItem::Not => {
                return Err(FilterError::IncompleteFilter {
                    msg: format!("missing connective before {}", item.describe()),
                });
            }
            StackItem::And | StackItem::Or => {
                return Err(FilterError::IncompleteFilter {
                    msg: format!("{} is missing its left operand", item.describe()),
                });
            }
        }
    }
    if expect_operand {
        let msg = if negations > 0 {
            "'not' without operand"
        } else if current.is_none() && terms.is_empty() {
            return Err(FilterError::EmptyExpression);
        } else {
            "connective without right operand"
        };
        return Err(FilterError::IncompleteFilter { msg: msg.into() });
    }
    terms.extend(current);
    let mut terms = terms.into_iter();
    let first = terms.next().ok_or(FilterError::EmptyExpression)?;
    Ok(terms.fold(first, AstNode::or))
}

/// Build the tree of one expression from its tokens.
pub fn parse<I: IntoIterator<Item = Token>>(tokens: I) -> Result<Ast, FilterError> {
    let mut stack = ParseStack::new();
    for token in tokens {
        stack.push(token)?;
    }
    stack.finish()
}
