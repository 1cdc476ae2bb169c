//! Pixel storage with explicit ownership.
//!
//! A buffer either owns its bytes (shared copy-on-write between clones) or
//! borrows a window of someone else's bytes. Borrowed storage keeps its
//! source alive and may carry a release hook that fires once the last
//! borrower is gone.

use std::fmt;
use std::sync::Arc;

/// Bytes that can be lent to a borrowed storage window.
pub type SharedBytes = Arc<dyn AsRef<[u8]> + Send + Sync>;

/// Whether storage owns its bytes or aliases another holder's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

/// Runs a callback when the last borrower drops.
pub struct ReleaseGuard {
    hook: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ReleaseGuard {
    pub fn new(hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl fmt::Debug for ReleaseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseGuard")
            .field("pending", &self.hook.is_some())
            .finish()
    }
}

/// Backing store of a frame buffer.
#[derive(Clone)]
pub enum PixelStorage {
    Owned(Arc<Vec<u8>>),
    Borrowed {
        source: SharedBytes,
        offset: usize,
        len: usize,
        release: Option<Arc<ReleaseGuard>>,
    },
}

impl PixelStorage {
    pub fn owned(data: Vec<u8>) -> Self {
        Self::Owned(Arc::new(data))
    }

    /// Borrow `len` bytes at `offset` of `source`.
    ///
    /// Returns `None` if the window does not fit inside the source.
    pub fn borrowed(
        source: SharedBytes,
        offset: usize,
        len: usize,
        release: Option<ReleaseGuard>,
    ) -> Option<Self> {
        let available = (*source).as_ref().len();
        if offset.checked_add(len)? > available {
            return None;
        }
        Some(Self::Borrowed {
            source,
            offset,
            len,
            release: release.map(Arc::new),
        })
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            Self::Owned(_) => Ownership::Owned,
            Self::Borrowed { .. } => Ownership::Borrowed,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data.as_slice(),
            Self::Borrowed {
                source,
                offset,
                len,
                ..
            } => &(**source).as_ref()[*offset..*offset + *len],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Owned(data) => data.len(),
            Self::Borrowed { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable bytes. Borrowed storage is first detached into an owned copy;
    /// owned storage shared with other holders is cloned on write.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        if let Self::Borrowed { .. } = self {
            *self = Self::owned(self.bytes().to_vec());
        }
        match self {
            Self::Owned(data) => Arc::make_mut(data).as_mut_slice(),
            Self::Borrowed { .. } => &mut [],
        }
    }

    /// Handle that another holder can borrow from without copying.
    ///
    /// The returned bytes stay alive (and the release hook pending) for as
    /// long as the handle is held.
    pub fn share(&self) -> (SharedBytes, usize, usize) {
        match self {
            Self::Owned(data) => {
                let len = data.len();
                (data.clone() as SharedBytes, 0, len)
            }
            Self::Borrowed {
                source,
                offset,
                len,
                release,
            } => match release {
                Some(guard) => {
                    let keep = KeepAlive {
                        source: source.clone(),
                        _guard: guard.clone(),
                    };
                    (Arc::new(keep) as SharedBytes, *offset, *len)
                }
                None => (source.clone(), *offset, *len),
            },
        }
    }

    /// Whether both storages view the same bytes.
    pub fn same_bytes(&self, other: &Self) -> bool {
        let a = self.bytes();
        let b = other.bytes();
        a.len() == b.len() && std::ptr::eq(a.as_ptr(), b.as_ptr())
    }
}

impl fmt::Debug for PixelStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(data) => f
                .debug_struct("Owned")
                .field("len", &data.len())
                .field("holders", &Arc::strong_count(data))
                .finish(),
            Self::Borrowed {
                offset,
                len,
                release,
                ..
            } => f
                .debug_struct("Borrowed")
                .field("offset", offset)
                .field("len", len)
                .field("release_hook", &release.is_some())
                .finish(),
        }
    }
}

struct KeepAlive {
    source: SharedBytes,
    _guard: Arc<ReleaseGuard>,
}

impl AsRef<[u8]> for KeepAlive {
    fn as_ref(&self) -> &[u8] {
        (*self.source).as_ref()
    }
}
