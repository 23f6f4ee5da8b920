// Charon - A hypermedia resource client toolkit
//
// This library layers clients, resource managers and service calls over a
// shared configuration tree, runs responses through middleware, and reports
// failures as a typed error taxonomy.

// Re-export core functionality
pub use charon_http_client::*;

// Re-export optional crates
#[cfg(feature = "testing")]
pub use charon_testing;

// Prelude for common imports
pub mod prelude {
    pub use charon_http_client::prelude::*;

    #[cfg(feature = "testing")]
    pub use charon_testing::{MockTransport, StepSpy};
}
