//! Runtime for the Orchid orchestration language.
//!
//! Orchid scripts compose reasoning operations — delegated to an external
//! intelligence [`Provider`] — with ordinary control flow, parallel `fork`
//! branches, transactional `###` blocks, events, checkpoints, and behavior
//! tags. This crate is the whole execution pipeline: the
//! indentation-sensitive [`lexer`], the recursive-descent [`parse`r](parse),
//! and the cooperative tree-walking interpreter [`Interp`].
//!
//! The interpreter is single-threaded and async: provider calls, MCP tool
//! calls, plugin operations, `listen()`, and `timeout` timers are its
//! suspension points. Drive it from a current-thread runtime:
//!
//! ```
//! use orchid::{Interp, InterpOptions, Value, parse};
//!
//! let program = parse("x := 42\n").unwrap();
//! let interp = Interp::new(InterpOptions::default());
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .unwrap();
//! let result = runtime.block_on(interp.run(&program)).unwrap();
//! assert_eq!(result, Value::number(42.0));
//! ```

mod ast;
mod builtins;
mod config;
mod env;
mod error;
mod interp;
mod io;
mod lexer;
mod mcp;
mod parse;
mod plugin;
mod provider;
mod token;
mod tracer;
mod value;

pub use ast::{
    Arg, ArithOp, AssignTarget, CmpOp, Definition, ExceptArm, ForkBody, ForkBranch, InterpPart, LogicalOp, MetaEntry,
    Metadata, Node, Param, Program, RequireKind, Spanned, Tag, Tags,
};
pub use config::InterpOptions;
pub use env::{ScopeId, Scopes};
pub use error::{ErrorKind, OrchidError, RunResult};
pub use interp::{Interp, InterpBuilder};
pub use io::{BufferPrint, PrintWriter, StdPrint};
pub use lexer::lex;
pub use mcp::{ConfigOnlyMcp, McpConfig, McpManager, McpServerConfig, McpTransport, NoMcp, StaticMcp, load_config};
pub use parse::{parse, parse_tokens};
pub use plugin::{PluginCtx, PluginModule, TraceHandle};
pub use provider::{EchoProvider, GenerateFormat, Provider, ProviderCall, ResolvedTag};
pub use token::{Keyword, Pos, Token, TokenLoc};
pub use tracer::{TraceEntry, TraceLog};
pub use value::{Asset, Callable, EventValue, MediaType, Unit, Value, format_number};
