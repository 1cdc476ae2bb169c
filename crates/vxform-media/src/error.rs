//! Translation of native library errors into the pipeline's error taxonomy.

use vxform_core::VxError;
use vxform_native::NativeError;

/// Map an error raised while converting or allocating frames.
pub fn from_native(err: NativeError) -> VxError {
    match err {
        NativeError::OutOfMemory(m) => VxError::AllocationFailure(m),
        NativeError::HwTransfer(m) => VxError::AllocationFailure(format!("device transfer: {m}")),
        NativeError::NotSupported(m) => VxError::UnsupportedFormat(m),
        NativeError::InvalidArgument(m) => VxError::InvalidParameter(m),
        NativeError::FilterNotFound(m) => VxError::GraphBuild(format!("no such filter: {m}")),
        NativeError::GraphConfig(m) => VxError::GraphBuild(m),
        NativeError::Again => VxError::GraphRuntime(NativeError::Again.to_string()),
    }
}

/// Map an error raised while parsing or configuring a filter graph.
pub fn graph_build(err: NativeError) -> VxError {
    match err {
        NativeError::OutOfMemory(m) => VxError::AllocationFailure(m),
        other => VxError::GraphBuild(other.to_string()),
    }
}

/// Map an error raised while pushing, pulling or commanding a live graph.
pub fn graph_runtime(err: NativeError) -> VxError {
    match err {
        NativeError::OutOfMemory(m) => VxError::AllocationFailure(m),
        other => VxError::GraphRuntime(other.to_string()),
    }
}
