//! # Ruxy Pre-renderer Ground Truth
//!
//! Build-time rendering of the primary branch. The instrumentation step records
//! every HTML primitive a route instantiates into a [`Registry`]; this crate
//! turns that registry into literal HTML with server values left as
//! placeholder tokens.
//!
//! ## Pipeline
//!
//! ```text
//! Registry ─▶ validate ─▶ resolve (bottom-up, bubbling) ─▶ finalize ─▶ PrerenderOutput
//!                              │
//!                              └─ attempt ─▶ static_eval / markup / placeholder
//! ```
//!
//! ## Invariants
//!
//! 1. **Server values are opaque**: a server value is only ever written as a
//!    `__RUXY_SV_…__` token. Conditions, arithmetic and member access on it
//!    are not computable at build time.
//!
//! 2. **No holes**: a primitive with a deferred child is itself deferred.
//!
//! 3. **Bounded bubbling**: a deferred primitive is retried once per ancestor,
//!    with that ancestor's bindings added behind its own. A primitive still
//!    deferred at the root fails the build with `RX-ERR-RESOLVE-001` unless
//!    `onUnresolvable` is `deferToServe`.
//!
//! 4. **Document order**: children are written in `childrenIds` order.
//!
//! 5. **Provenance**: `unknown` props outside the primary branch are rejected
//!    before anything is rendered (`RX-ERR-PROVENANCE-001`).

pub mod config;
pub mod discovery;
pub mod evaluator;
pub mod finalize;
pub mod markup;
pub mod placeholder;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod static_eval;
pub mod validate;
pub mod value;


pub use config::{PrerenderConfig, UnresolvablePolicy, CONFIG_FILE_NAME};
pub use evaluator::{attempt, Attempt, ChildState, DeferReason, RenderedHtml};
pub use finalize::{prerender, verify_placeholders, PrerenderOutput, RenderedTree};
pub use placeholder::{emit_placeholder, scan_placeholders, PlaceholderManifest};
pub use registry::{PrimitiveRecord, PropValue, Provenance, Registry, RegistryFile};
pub use resolver::{resolve, Resolution, ResolutionState, ResolveStats};
pub use validate::{collect_errors, validate_registry, Diagnostic, PrerenderError};

#[cfg(feature = "napi")]
pub use finalize::prerender_native;
#[cfg(feature = "napi")]
pub use validate::validate_registry_native;
