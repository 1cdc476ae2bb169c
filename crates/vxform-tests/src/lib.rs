//! Integration test crate for VxForm.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every vxform crate to verify they work together.

#[cfg(test)]
mod convert;

#[cfg(test)]
mod transform;

#[cfg(test)]
mod blend;

/// Install a test subscriber honouring `RUST_LOG`; later calls are no-ops.
#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
