//! One module of handlers per instruction family. Each handler takes the execution context
//! first, followed by the fields of the instruction it runs.

pub(crate) mod apply_templates;
pub(crate) mod call_template;
pub(crate) mod control_flow;
pub(crate) mod copy;
pub(crate) mod literals;
pub(crate) mod sort;
pub(crate) mod variables;
