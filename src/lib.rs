//! Compile tcpdump-like filter expressions and run them against IPv4 and
//! IPv6 packets.
//!
//! ```
//! use ip6filter::Dispatch;
//! use ip6filter::Mode;
//! use ip6filter::PacketRef;
//! use ip6filter::ProgramSet;
//!
//! let set = ProgramSet::compile(
//!     ["dst net 10.0.0.0/8", "src host 2001:db8::1 and tcp opt ack", "-"],
//!     Mode::Classifier { default_output: None },
//! )
//! .unwrap();
//!
//! // version 4, ihl 5, total length 20, ttl 64, proto 6, 192.0.2.1 > 10.5.5.5
//! let data = [
//!     0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x06, 0x00, 0x00, 0xc0, 0x00,
//!     0x02, 0x01, 0x0a, 0x05, 0x05, 0x05,
//! ];
//! assert_eq!(set.classify(&PacketRef::from_ip(&data)), Dispatch::Output(0));
//! ```

use std::result;

pub mod ast;
pub mod error;
pub mod filter;
pub mod lexer;
pub mod packet;
pub mod parser;
pub mod primitive;

#[cfg(test)]
mod test_utils;

pub use ast::Ast;
pub use ast::AstNode;
pub use error::CompileError;
pub use error::FilterError;
pub use filter::Dispatch;
pub use filter::FilterAction;
pub use filter::Mode;
pub use filter::Program;
pub use filter::ProgramConfig;
pub use filter::ProgramHandle;
pub use filter::ProgramSet;
pub use filter::Verdict;
pub use packet::PacketRef;
pub use packet::PacketView;
pub use primitive::Operator;
pub use primitive::Primitive;
pub use primitive::PrimitiveToken;
pub use primitive::TcpFlag;

pub type Result<T, E = error::FilterError> = result::Result<T, E>;

/// Lex and parse one expression.
pub fn compile(expression: &str) -> Result<Ast> {
    let tokens = lexer::lex(expression)?;
    parser::parse(tokens)
}
