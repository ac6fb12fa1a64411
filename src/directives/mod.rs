//! 指令解释：从智能体输出中找出形如 `name(args)` 的调用并在工作区中执行

pub mod events;
pub mod handlers;
pub mod interpreter;
pub mod parser;
pub mod registry;

pub use events::{DirectiveEvent, InterpretReport};
pub use interpreter::DirectiveInterpreter;
pub use parser::{parse_call, scan_candidates, Candidate, Directive, Literal};
pub use registry::{canonical_name, Args, DirectiveContext, DirectiveHandler, DirectiveRegistry};
