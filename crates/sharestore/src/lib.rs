//! Code-addressed storage for sharebox.
//!
//! Every uploaded file and every shared text gets a random 8-digit
//! [`ShareCode`]. The code is the only handle a client ever needs: it is
//! returned on upload and resolves back to the stored content on retrieval.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sharestore::{ArtifactStore, CounterStore, FileStore, StoreConfig};
//!
//! let config = StoreConfig::with_base_path("/var/lib/sharebox");
//! let store = FileStore::new(config.clone()).unwrap();
//!
//! let code = store.put_text("meet at noon").unwrap();
//! println!("share this: {}", code);
//!
//! if let Some(artifact) = store.resolve(&code).unwrap() {
//!     println!("got a {:?}", artifact.kind());
//! }
//!
//! let visits = CounterStore::new(&config);
//! println!("visitor #{}", visits.increment_and_persist().unwrap());
//! ```
//!
//! # Guarantees
//!
//! - A code never refers to more than one artifact, across files and text
//! - Content is visible under its code only once fully written
//! - Counter increments are serialized and never lost within a process

pub mod artifact;
pub mod code;
pub mod config;
pub mod counter;
pub mod error;
pub mod index;
pub mod mime;
pub mod staging;
pub mod store;

pub use artifact::{Artifact, ArtifactKind, ArtifactRef, FileArtifact, TextArtifact};
pub use code::{CodeError, CodeGenerator, RandomCodeGenerator, ShareCode};
pub use config::StoreConfig;
pub use counter::CounterStore;
pub use error::{Result, ShareError};
pub use store::{ArtifactStore, FileStore};
