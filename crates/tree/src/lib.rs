//! An arena XML document model for the trellis engines.
//!
//! Documents are parsed with roxmltree, built or edited through `&mut Document`, frozen
//! behind an `Rc` and navigated through [`Node`] handles, which implement the XPath
//! [`DataSourceNode`](trellis_xpath1::DataSourceNode) adapter. Result trees are written
//! back out with [`serialize`].

pub mod document;
pub mod error;
pub mod node;
pub mod parse;
pub mod serialize;

pub use document::{Document, DocumentId, DocumentKind, Location, NodeId, NodeName, is_whitespace};
pub use error::TreeError;
pub use node::Node;
pub use parse::ParseOptions;
pub use serialize::{OutputMethod, OutputSettings, serialize};
