use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use std::sync::RwLock;
use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::EnumString;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::ast::Ast;
use crate::error::CompileError;
use crate::error::FilterError;
use crate::packet::PacketView;

/// What filter mode does with a packet once every program has run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterAction {
    /// Log the verdicts and always pass the packet to output 0.
    #[default]
    LogOnly,
    /// Pass the packet to output 0 when any program matches, drop it otherwise.
    Gate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mode {
    /// First matching program wins.
    Classifier {
        #[serde(default)]
        default_output: Option<usize>,
    },
    /// Every program is evaluated.
    Filter {
        #[serde(default)]
        action: FilterAction,
    },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Classifier {
            default_output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// One expression per output, in output order.
    pub expressions: Vec<String>,
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    output: usize,
    expression: String,
    ast: Ast,
}

impl Program {
    pub fn output(&self) -> usize {
        self.output
    }
    pub fn expression(&self) -> &str {
        &self.expression
    }
    pub fn ast(&self) -> &Ast {
        &self.ast
    }
    pub fn matches<P: PacketView + ?Sized>(&self, packet: &P) -> bool {
        self.ast.matches(packet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    Output(usize),
    Drop,
}

/// The result of one program on one packet in filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict<'a> {
    pub output: usize,
    pub expression: &'a str,
    pub matched: bool,
}

/// The compiled programs of one configuration. Never mutated once built;
/// reconfiguration builds a new set and swaps it in through a
/// [`ProgramHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSet {
    programs: Vec<Program>,
    rejected: Vec<CompileError>,
    mode: Mode,
}

impl ProgramSet {
    /// Compile every expression on its own. Expressions that fail are
    /// logged and kept in [`ProgramSet::rejected`]; the others keep the
    /// output index of their position in `expressions`.
    pub fn compile<I, S>(expressions: I, mode: Mode) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut programs = Vec::new();
        let mut rejected = Vec::new();
        let mut outputs = 0;
        for (index, expression) in expressions.into_iter().enumerate() {
            let expression = expression.as_ref();
            outputs += 1;
            match expression.parse::<Ast>() {
                Ok(ast) => {
                    debug!("program [{}] compiled: {}", index, ast);
                    programs.push(Program {
                        output: index,
                        expression: expression.to_string(),
                        ast,
                    });
                }
                Err(error) => {
                    let e = CompileError {
                        index,
                        expression: expression.to_string(),
                        error,
                    };
                    warn!("{}", e);
                    rejected.push(e);
                }
            }
        }
        if let Mode::Classifier {
            default_output: Some(output),
        } = mode
        {
            if output > outputs {
                return Err(FilterError::InvalidDefaultOutput { output, outputs });
            }
        }
        Ok(ProgramSet {
            programs,
            rejected,
            mode,
        })
    }
    pub fn from_config(config: &ProgramConfig) -> Result<Self, FilterError> {
        Self::compile(&config.expressions, config.mode)
    }
    pub fn programs(&self) -> &[Program] {
        &self.programs
    }
    pub fn rejected(&self) -> &[CompileError] {
        &self.rejected
    }
    pub fn mode(&self) -> Mode {
        self.mode
    }
    pub fn len(&self) -> usize {
        self.programs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
    fn default_output(&self) -> Option<usize> {
        match self.mode {
            Mode::Classifier { default_output } => default_output,
            Mode::Filter { .. } => None,
        }
    }
    /// First match wins; without a match the packet goes to the default
    /// output, or is dropped when there is none.
    pub fn classify<P: PacketView + ?Sized>(&self, packet: &P) -> Dispatch {
        match self.programs.iter().find(|program| program.matches(packet)) {
            Some(program) => {
                trace!("packet matched program [{}]", program.output);
                Dispatch::Output(program.output)
            }
            None => match self.default_output() {
                Some(output) => Dispatch::Output(output),
                None => Dispatch::Drop,
            },
        }
    }
    pub fn evaluate_all<P: PacketView + ?Sized>(&self, packet: &P) -> Vec<Verdict<'_>> {
        self.programs
            .iter()
            .map(|program| Verdict {
                output: program.output,
                expression: &program.expression,
                matched: program.matches(packet),
            })
            .collect()
    }
    pub fn filter<P: PacketView + ?Sized>(&self, packet: &P) -> Dispatch {
        let verdicts = self.evaluate_all(packet);
        for v in &verdicts {
            trace!("[{}] {} => {}", v.output, v.expression, v.matched);
        }
        let action = match self.mode {
            Mode::Filter { action } => action,
            Mode::Classifier { .. } => FilterAction::default(),
        };
        match action {
            FilterAction::LogOnly => Dispatch::Output(0),
            FilterAction::Gate => {
                if verdicts.iter().any(|v| v.matched) {
                    Dispatch::Output(0)
                } else {
                    Dispatch::Drop
                }
            }
        }
    }
    pub fn process<P: PacketView + ?Sized>(&self, packet: &P) -> Dispatch {
        let dispatch = match self.mode {
            Mode::Classifier { .. } => self.classify(packet),
            Mode::Filter { .. } => self.filter(packet),
        };
        trace!("dispatch: {:?}", dispatch);
        dispatch
    }
}

/// Shared access to the active program set. Readers take a snapshot with
/// [`ProgramHandle::load`]; reconfiguration replaces the whole set.
#[derive(Debug, Clone)]
pub struct ProgramHandle {
    inner: Arc<RwLock<Arc<ProgramSet>>>,
}

impl ProgramHandle {
    pub fn new(set: ProgramSet) -> Self {
        ProgramHandle {
            inner: Arc::new(RwLock::new(Arc::new(set))),
        }
    }
    pub fn load(&self) -> Result<Arc<ProgramSet>, FilterError> {
        match self.inner.read() {
            Ok(set) => Ok(Arc::clone(&set)),
            Err(e) => Err(FilterError::UnlockProgramError { e: e.to_string() }),
        }
    }
    /// Install `set` and return the one it replaces. Snapshots already
    /// loaded keep evaluating against the old set.
    pub fn swap(&self, set: ProgramSet) -> Result<Arc<ProgramSet>, FilterError> {
        match self.inner.write() {
            Ok(mut current) => {
                info!(
                    "swapping in {} programs ({} rejected)",
                    set.len(),
                    set.rejected().len()
                );
                Ok(std::mem::replace(&mut *current, Arc::new(set)))
            }
            Err(e) => Err(FilterError::UnlockProgramError { e: e.to_string() }),
        }
    }
    pub fn process<P: PacketView + ?Sized>(&self, packet: &P) -> Result<Dispatch, FilterError> {
        Ok(self.load()?.process(packet))
    }
}
