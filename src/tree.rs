//! The client-side file-handle cache: one root inode per mounted export,
//! each directory inode owning a name-keyed map of children.
//!
//! The tree is guarded by its own mutex, entirely separate from a
//! [`Session`]'s socket mutex. Callers needing both must acquire the tree
//! lock first - the reverse ordering is never taken anywhere in this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::nfs;
use crate::session::Session;
use crate::{Error, NfsStat, StableHow};

/// The type of filesystem object an [`Inode`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A regular file.
    Reg,
    /// A directory.
    Dir,
    /// A block device.
    Blk,
    /// A character device.
    Chr,
    /// A symbolic link.
    Lnk,
    /// A Unix domain socket.
    Sock,
    /// A named pipe.
    Fifo,
}

/// The default permission bits applied to newly-created directories.
pub const DEFAULT_DIR_PERMS: u32 = 0o755;
/// The default permission bits applied to newly-created regular files.
pub const DEFAULT_FILE_PERMS: u32 = 0o644;

/// A node in the client's file-handle cache.
///
/// Every non-root inode holds a weak reference to its parent - the tree
/// owns the inode graph top-down through `children`, so a back-pointer
/// strong enough to keep the parent alive would create a cycle neither side
/// can ever free.
#[derive(Debug)]
pub struct Inode {
    file_type: FileType,
    perms: u32,
    /// Unqualified leaf name. Empty for the tree root.
    name: String,
    /// Fully-qualified path, populated for directories only.
    path: Option<String>,
    handle: Mutex<Option<Vec<u8>>>,
    parent: Weak<Inode>,
    children: Mutex<HashMap<String, Arc<Inode>>>,
}

impl Inode {
    fn new_root(export_path: &str, handle: Vec<u8>) -> Arc<Self> {
        Arc::new(Inode {
            file_type: FileType::Dir,
            perms: DEFAULT_DIR_PERMS,
            name: String::new(),
            path: Some(export_path.to_string()),
            handle: Mutex::new(Some(handle)),
            parent: Weak::new(),
            children: Mutex::new(HashMap::new()),
        })
    }

    fn new_child(
        parent: &Arc<Inode>,
        name: &str,
        file_type: FileType,
        handle: Option<Vec<u8>>,
    ) -> Arc<Self> {
        let path = match file_type {
            FileType::Dir => Some(match parent.path.as_deref() {
                Some(p) => format!("{p}/{name}"),
                None => name.to_string(),
            }),
            _ => None,
        };

        let perms = match file_type {
            FileType::Dir => DEFAULT_DIR_PERMS,
            _ => DEFAULT_FILE_PERMS,
        };

        Arc::new(Inode {
            file_type,
            perms,
            name: name.to_string(),
            path,
            handle: Mutex::new(handle),
            parent: Arc::downgrade(parent),
            children: Mutex::new(HashMap::new()),
        })
    }

    /// The type of filesystem object this inode represents.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// The default permission bits recorded for this inode.
    pub fn perms(&self) -> u32 {
        self.perms
    }

    /// This inode's leaf name, or an empty string for a mount root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully-qualified path, for directory inodes only.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// A strong reference to the parent inode, if this is not a root.
    pub fn parent(&self) -> Option<Arc<Inode>> {
        self.parent.upgrade()
    }

    /// The cached file handle, if one has been obtained yet.
    pub fn handle(&self) -> Option<Vec<u8>> {
        self.handle.lock().expect("inode mutex poisoned").clone()
    }

    /// Looks up `name` under this (directory) inode, returning the cached
    /// child if one already exists with a known handle - satisfies P5: a
    /// repeat lookup of the same name never issues a second RPC.
    pub fn lookup(self: &Arc<Self>, session: &Session, name: &str) -> Result<Arc<Inode>, Error> {
        {
            let children = self.children.lock().expect("inode mutex poisoned");
            if let Some(child) = children.get(name) {
                if child.handle().is_some() {
                    return Ok(Arc::clone(child));
                }
            }
        }

        let parent_handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(name.to_string()))?;

        match nfs::lookup(session, &parent_handle, name) {
            Ok(handle) => {
                let child = Inode::new_child(self, name, FileType::Reg, Some(handle));
                self.children
                    .lock()
                    .expect("inode mutex poisoned")
                    .insert(name.to_string(), Arc::clone(&child));
                Ok(child)
            }
            Err(Error::NfsStatus(NfsStat::Stale)) => {
                self.invalidate(name);
                Err(Error::NfsStatus(NfsStat::Stale))
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a subdirectory named `name`, caching the resulting inode.
    ///
    /// On `NFS3ERR_STALE` this (parent) inode detaches itself from its own
    /// parent's cache (P7), the same as [`Inode::read`]/[`Inode::write`].
    pub fn mkdir(self: &Arc<Self>, session: &Session, name: &str) -> Result<Arc<Inode>, Error> {
        let parent_handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(name.to_string()))?;

        let handle = nfs::mkdir(session, &parent_handle, name).inspect_err(|e| self.detach_if_stale(e))?;
        let child = Inode::new_child(self, name, FileType::Dir, Some(handle));
        self.children
            .lock()
            .expect("inode mutex poisoned")
            .insert(name.to_string(), Arc::clone(&child));
        Ok(child)
    }

    /// Creates a regular file named `name`, caching the resulting inode.
    ///
    /// On `NFS3ERR_STALE` this (parent) inode detaches itself from its own
    /// parent's cache (P7), the same as [`Inode::read`]/[`Inode::write`].
    pub fn create(self: &Arc<Self>, session: &Session, name: &str) -> Result<Arc<Inode>, Error> {
        let parent_handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(name.to_string()))?;

        let handle = nfs::create(session, &parent_handle, name).inspect_err(|e| self.detach_if_stale(e))?;
        let child = Inode::new_child(self, name, FileType::Reg, Some(handle));
        self.children
            .lock()
            .expect("inode mutex poisoned")
            .insert(name.to_string(), Arc::clone(&child));
        Ok(child)
    }

    /// Reads up to `count` bytes from this (regular file) inode at `offset`.
    ///
    /// On `NFS3ERR_STALE` this inode detaches itself from its parent's
    /// cache (P7) - the caller is expected to re-`lookup` rather than retry.
    pub fn read(&self, session: &Session, offset: u64, count: u32) -> Result<nfs::ReadResult, Error> {
        let handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(self.name.clone()))?;

        nfs::read(session, &handle, offset, count).inspect_err(|e| self.detach_if_stale(e))
    }

    /// Writes `data` to this (regular file) inode at `offset`.
    ///
    /// On `NFS3ERR_STALE` this inode detaches itself from its parent's
    /// cache (P7) - the caller is expected to re-`lookup` rather than retry.
    pub fn write(
        &self,
        session: &Session,
        offset: u64,
        data: &[u8],
        stable: StableHow,
    ) -> Result<nfs::WriteResult, Error> {
        let handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(self.name.clone()))?;

        nfs::write(session, &handle, offset, data, stable).inspect_err(|e| self.detach_if_stale(e))
    }

    fn detach_if_stale(&self, e: &Error) {
        if matches!(e, Error::NfsStatus(NfsStat::Stale)) {
            if let Some(parent) = self.parent() {
                parent
                    .children
                    .lock()
                    .expect("inode mutex poisoned")
                    .remove(&self.name);
            }
        }
    }

    /// Removes the file named `name` from this directory, detaching any
    /// cached child inode.
    ///
    /// On `NFS3ERR_STALE` this (parent) inode detaches itself from its own
    /// parent's cache (P7), the same as [`Inode::read`]/[`Inode::write`].
    pub fn remove(self: &Arc<Self>, session: &Session, name: &str) -> Result<(), Error> {
        let parent_handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(name.to_string()))?;

        nfs::remove(session, &parent_handle, name).inspect_err(|e| self.detach_if_stale(e))?;
        self.children.lock().expect("inode mutex poisoned").remove(name);
        Ok(())
    }

    /// Removes the empty directory named `name` from this directory,
    /// detaching any cached child inode.
    ///
    /// On `NFS3ERR_STALE` this (parent) inode detaches itself from its own
    /// parent's cache (P7), the same as [`Inode::read`]/[`Inode::write`].
    pub fn rmdir(self: &Arc<Self>, session: &Session, name: &str) -> Result<(), Error> {
        let parent_handle = self
            .handle()
            .ok_or_else(|| Error::InvalidName(name.to_string()))?;

        nfs::rmdir(session, &parent_handle, name).inspect_err(|e| self.detach_if_stale(e))?;
        self.children.lock().expect("inode mutex poisoned").remove(name);
        Ok(())
    }

    /// Drops the cached child named `name`, if any - used when an RPC
    /// against that child fails with `NFS3ERR_STALE` (P7).
    fn invalidate(&self, name: &str) {
        self.children.lock().expect("inode mutex poisoned").remove(name);
    }
}

/// One mapping per session: export path to the root [`Inode`] obtained by
/// mounting it.
#[derive(Debug, Default)]
pub struct Tree {
    roots: Mutex<HashMap<String, Arc<Inode>>>,
}

impl Tree {
    /// Constructs an empty tree.
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts a root inode for `export_path` if one is not already
    /// present. Re-mounting the same export is a no-op - the existing root
    /// (and its cached subtree) is returned unchanged.
    pub fn get_or_insert_root(&self, export_path: &str, handle: Vec<u8>) -> Arc<Inode> {
        let mut roots = self.roots.lock().expect("tree mutex poisoned");
        roots
            .entry(export_path.to_string())
            .or_insert_with(|| Inode::new_root(export_path, handle))
            .clone()
    }

    /// Returns the cached root for `export_path`, if mounted.
    pub fn get_root(&self, export_path: &str) -> Option<Arc<Inode>> {
        self.roots
            .lock()
            .expect("tree mutex poisoned")
            .get(export_path)
            .cloned()
    }

    /// Drops the subtree rooted at `export_path` - called on `UMNT`.
    pub fn drop_root(&self, export_path: &str) {
        self.roots.lock().expect("tree mutex poisoned").remove(export_path);
    }
}
