//! Read-only memory mapping with an `mlock`ed lifetime: open, map, lock,
//! and unlock on drop, matching the on-disk index's read-only, whole-file
//! access pattern.
//!
//! `mlock` failure is logged as a warning rather than treated as fatal:
//! it commonly fails under an unprivileged `ulimit -l`, and the search
//! engine still functions (just without the guaranteed page residency),
//! so there is no taxonomy entry in the error design that demands
//! aborting on it.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::warn;

use crate::error::PptError;

pub struct LockedMmap {
    mmap: Mmap,
    #[cfg(unix)]
    locked: bool,
}

impl LockedMmap {
    pub fn open(path: &Path) -> Result<Self, PptError> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and the file is not truncated
        // for the lifetime of this reader; `IndexReader` holds this value
        // for as long as any borrow of its bytes is alive.
        let mmap = unsafe { Mmap::map(&file)? };

        #[cfg(unix)]
        let locked = {
            // Safety: `mmap.as_ptr()`/`mmap.len()` describe the mapping
            // this process just created above.
            let rc = unsafe { libc::mlock(mmap.as_ptr() as *const libc::c_void, mmap.len()) };
            if rc != 0 {
                warn!(path = %path.display(), "mlock failed, continuing without a locked mapping");
                false
            } else {
                true
            }
        };

        Ok(LockedMmap {
            mmap,
            #[cfg(unix)]
            locked,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Builds a `LockedMmap` over an anonymous, already-owned buffer for
    /// tests that want `IndexReader`'s mmap-shaped API without a real file.
    #[cfg(test)]
    pub(crate) fn from_owned_for_test(bytes: Vec<u8>) -> Self {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().expect("tmp file");
        tmp.write_all(&bytes).expect("write tmp file");
        let file = tmp.reopen().expect("reopen tmp file");
        let mmap = unsafe { Mmap::map(&file).expect("mmap tmp file") };
        // Keep the tempfile alive for the process lifetime; tests are
        // short-lived and this avoids plumbing an extra lifetime through
        // IndexReader just for its test constructor.
        std::mem::forget(tmp);
        LockedMmap {
            mmap,
            #[cfg(unix)]
            locked: false,
        }
    }
}

#[cfg(unix)]
impl Drop for LockedMmap {
    fn drop(&mut self) {
        if self.locked {
            // Safety: unlocking the same range this constructor locked.
            let rc = unsafe { libc::munlock(self.mmap.as_ptr() as *const libc::c_void, self.mmap.len()) };
            if rc != 0 {
                warn!("munlock failed");
            }
        }
    }
}
