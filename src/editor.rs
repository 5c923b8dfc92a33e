//! The commit editor handed out by [`crate::RemoteAccess::get_commit_editor`].
//!
//! Edits are recorded client-side as an editor drive and sent as a single
//! `commit` when the editor is closed. Aborting before that needs no network
//! traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{host_error, set_pending};
use crate::options::CommitOptions;
use crate::path::validate_rel_path;
use crate::pool::run_with_pool;
use crate::ra::{RaInner, lock_inner};
use crate::rasvn::edit::EditCommand;
use crate::svndiff::md5_hex;
use crate::types::{CommitInfo, Revnum};
use crate::value::{HostCallable, Value};
use crate::{Error, SvnError, codes};

/// Called with `(revnum, date, author)` once the commit went through.
pub type CommitCallback = Box<dyn HostCallable + Send>;

fn editor_finished() -> Error {
    Error::Runtime("Editor already closed/aborted".to_string())
}

#[derive(Debug)]
struct Node {
    token: String,
    is_dir: bool,
    parent: Option<usize>,
    closed: bool,
    open_child: Option<usize>,
    text_md5: Option<String>,
}

#[derive(Debug, Default)]
struct Drive {
    commands: Vec<EditCommand>,
    nodes: Vec<Node>,
    root_opened: bool,
    finished: bool,
}

impl Drive {
    fn check_active(&self) -> Result<(), Error> {
        if self.finished {
            return Err(editor_finished());
        }
        Ok(())
    }

    fn check_open(&self, idx: usize) -> Result<&Node, Error> {
        self.check_active()?;
        let node = &self.nodes[idx];
        if node.closed {
            let what = if node.is_dir { "directory" } else { "file" };
            return Err(Error::Runtime(format!("{what} closed already")));
        }
        Ok(node)
    }

    /// Registers a new child of `parent`, which must have no other open child.
    fn open_child(&mut self, parent: usize, is_dir: bool) -> Result<usize, Error> {
        if self.check_open(parent)?.open_child.is_some() {
            return Err(Error::Runtime("child is already open".to_string()));
        }
        let idx = self.push_node(Some(parent), is_dir);
        self.nodes[parent].open_child = Some(idx);
        Ok(idx)
    }

    fn push_node(&mut self, parent: Option<usize>, is_dir: bool) -> usize {
        let idx = self.nodes.len();
        let prefix = if is_dir { 'd' } else { 'c' };
        self.nodes.push(Node {
            token: format!("{prefix}{idx}"),
            is_dir,
            parent,
            closed: false,
            open_child: None,
            text_md5: None,
        });
        idx
    }

    fn close_node(&mut self, idx: usize, text_checksum: Option<String>) {
        let node = &mut self.nodes[idx];
        node.closed = true;
        let token = node.token.clone();
        let command = if node.is_dir {
            EditCommand::CloseDir { dir_token: token }
        } else {
            EditCommand::CloseFile {
                file_token: token,
                text_checksum: text_checksum.or_else(|| node.text_md5.clone()),
            }
        };
        if let Some(parent) = node.parent
            && self.nodes[parent].open_child == Some(idx)
        {
            self.nodes[parent].open_child = None;
        }
        self.commands.push(command);
    }

    /// Closes whatever is still open, innermost first.
    fn close_remaining(&mut self) {
        for idx in (0..self.nodes.len()).rev() {
            if !self.nodes[idx].closed {
                self.close_node(idx, None);
            }
        }
    }
}

type SharedDrive = Arc<Mutex<Drive>>;

fn lock_drive(drive: &SharedDrive) -> MutexGuard<'_, Drive> {
    drive.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A commit in progress.
///
/// While an editor is alive its [`crate::RemoteAccess`] refuses other
/// operations with [`Error::Busy`]. Dropping an editor that was neither
/// closed nor aborted abandons the commit.
pub struct CommitEditor {
    ra: Arc<Mutex<RaInner>>,
    busy: Arc<AtomicBool>,
    options: CommitOptions,
    callback: Option<CommitCallback>,
    drive: SharedDrive,
    released: bool,
}

impl std::fmt::Debug for CommitEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitEditor")
            .field("options", &self.options)
            .field("drive", &self.drive)
            .finish()
    }
}

impl CommitEditor {
    pub(crate) fn new(
        ra: Arc<Mutex<RaInner>>,
        busy: Arc<AtomicBool>,
        options: CommitOptions,
        callback: Option<CommitCallback>,
    ) -> Self {
        Self {
            ra,
            busy,
            options,
            callback,
            drive: SharedDrive::default(),
            released: false,
        }
    }

    /// Opens the root directory of the edit at `base_revision`
    /// (negative for HEAD).
    pub fn open_root(&mut self, base_revision: Revnum) -> Result<DirectoryEditor, Error> {
        let mut drive = lock_drive(&self.drive);
        drive.check_active()?;
        if drive.root_opened {
            return Err(Error::Runtime("root directory already opened".to_string()));
        }
        drive.root_opened = true;
        let idx = drive.push_node(None, true);
        let token = drive.nodes[idx].token.clone();
        drive.commands.push(EditCommand::OpenRoot {
            rev: (base_revision >= 0).then_some(base_revision),
            token,
        });
        Ok(DirectoryEditor {
            drive: Arc::clone(&self.drive),
            idx,
        })
    }

    /// Sends the recorded edit and finishes the commit.
    ///
    /// Directories and files still open are closed first. The commit
    /// callback, if any, runs before a post-commit hook failure is reported.
    pub fn close(&mut self) -> Result<CommitInfo, Error> {
        let commands = {
            let mut drive = lock_drive(&self.drive);
            drive.check_active()?;
            drive.finished = true;
            drive.close_remaining();
            drive.commands.push(EditCommand::CloseEdit);
            std::mem::take(&mut drive.commands)
        };
        let options = &self.options;
        let callback = &mut self.callback;
        let ra = &self.ra;
        let result = run_with_pool(None, |_pool| {
            let mut inner = lock_inner(ra);
            let RaInner {
                runtime, session, ..
            } = &mut *inner;
            let info = runtime.block_on(session.commit(options, &commands))?;
            if let Some(callback) = callback.as_mut() {
                let args = vec![
                    Value::Int(info.revision),
                    info.date.clone().into(),
                    info.author.clone().into(),
                ];
                if let Err(err) = callback.call(args) {
                    set_pending(err.into());
                    return Err(host_error());
                }
            }
            if let Some(msg) = &info.post_commit_err {
                return Err(SvnError::new(codes::REPOS_POST_COMMIT_HOOK_FAILED, msg.clone()));
            }
            Ok(info)
        });
        self.release();
        if let Ok(info) = &result {
            debug!(revision = info.revision, "commit editor closed");
        }
        result
    }

    /// Abandons the edit.
    pub fn abort(&mut self) -> Result<(), Error> {
        {
            let mut drive = lock_drive(&self.drive);
            drive.check_active()?;
            drive.finished = true;
            drive.commands.clear();
        }
        debug!("commit editor aborted");
        self.release();
        Ok(())
    }

    /// Hands the busy flag back, once per editor.
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.busy.store(false, Ordering::Release);
        }
    }
}

impl Drop for CommitEditor {
    fn drop(&mut self) {
        lock_drive(&self.drive).finished = true;
        self.release();
    }
}

/// A directory opened or added during a commit.
#[derive(Debug)]
pub struct DirectoryEditor {
    drive: SharedDrive,
    idx: usize,
}

impl DirectoryEditor {
    fn token(drive: &Drive, idx: usize) -> String {
        drive.nodes[idx].token.clone()
    }

    /// Adds a directory, optionally copied from `copyfrom` (`(url, rev)`).
    pub fn add_directory(
        &mut self,
        path: &str,
        copyfrom: Option<(&str, Revnum)>,
    ) -> Result<DirectoryEditor, Error> {
        let path = validate_rel_path(path)?;
        let mut drive = lock_drive(&self.drive);
        let child = drive.open_child(self.idx, true)?;
        let command = EditCommand::AddDir {
            path,
            parent_token: Self::token(&drive, self.idx),
            child_token: Self::token(&drive, child),
            copy_from: copyfrom.map(|(url, rev)| (url.to_string(), rev)),
        };
        drive.commands.push(command);
        Ok(DirectoryEditor {
            drive: Arc::clone(&self.drive),
            idx: child,
        })
    }

    pub fn open_directory(&mut self, path: &str, base_revision: Revnum) -> Result<DirectoryEditor, Error> {
        let path = validate_rel_path(path)?;
        let mut drive = lock_drive(&self.drive);
        let child = drive.open_child(self.idx, true)?;
        let command = EditCommand::OpenDir {
            path,
            parent_token: Self::token(&drive, self.idx),
            child_token: Self::token(&drive, child),
            rev: (base_revision >= 0).then_some(base_revision),
        };
        drive.commands.push(command);
        Ok(DirectoryEditor {
            drive: Arc::clone(&self.drive),
            idx: child,
        })
    }

    pub fn add_file(&mut self, path: &str, copyfrom: Option<(&str, Revnum)>) -> Result<FileEditor, Error> {
        let path = validate_rel_path(path)?;
        let mut drive = lock_drive(&self.drive);
        let child = drive.open_child(self.idx, false)?;
        let command = EditCommand::AddFile {
            path,
            dir_token: Self::token(&drive, self.idx),
            file_token: Self::token(&drive, child),
            copy_from: copyfrom.map(|(url, rev)| (url.to_string(), rev)),
        };
        drive.commands.push(command);
        Ok(FileEditor {
            drive: Arc::clone(&self.drive),
            idx: child,
        })
    }

    pub fn open_file(&mut self, path: &str, base_revision: Revnum) -> Result<FileEditor, Error> {
        let path = validate_rel_path(path)?;
        let mut drive = lock_drive(&self.drive);
        let child = drive.open_child(self.idx, false)?;
        let command = EditCommand::OpenFile {
            path,
            dir_token: Self::token(&drive, self.idx),
            file_token: Self::token(&drive, child),
            rev: (base_revision >= 0).then_some(base_revision),
        };
        drive.commands.push(command);
        Ok(FileEditor {
            drive: Arc::clone(&self.drive),
            idx: child,
        })
    }

    /// Deletes the entry at `path`, which must be at `revision` unless that
    /// is negative.
    pub fn delete_entry(&mut self, path: &str, revision: Revnum) -> Result<(), Error> {
        let path = validate_rel_path(path)?;
        let mut drive = lock_drive(&self.drive);
        drive.check_open(self.idx)?;
        let command = EditCommand::DeleteEntry {
            path,
            rev: (revision >= 0).then_some(revision),
            dir_token: Self::token(&drive, self.idx),
        };
        drive.commands.push(command);
        Ok(())
    }

    /// Sets a property; `None` deletes it.
    pub fn change_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), Error> {
        let mut drive = lock_drive(&self.drive);
        drive.check_open(self.idx)?;
        let command = EditCommand::ChangeDirProp {
            dir_token: Self::token(&drive, self.idx),
            name: name.to_string(),
            value: value.map(<[u8]>::to_vec),
        };
        drive.commands.push(command);
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        let mut drive = lock_drive(&self.drive);
        if drive.check_open(self.idx)?.open_child.is_some() {
            return Err(Error::Runtime("child is still open".to_string()));
        }
        drive.close_node(self.idx, None);
        Ok(())
    }
}

/// A file added or opened during a commit.
#[derive(Debug)]
pub struct FileEditor {
    drive: SharedDrive,
    idx: usize,
}

impl FileEditor {
    /// Replaces the file's contents with `contents`.
    ///
    /// `base_checksum` is the hex MD5 the server should find for the text
    /// being replaced, if known.
    pub fn apply_text(&mut self, base_checksum: Option<&str>, contents: &[u8]) -> Result<(), Error> {
        let mut drive = lock_drive(&self.drive);
        if drive.check_open(self.idx)?.text_md5.is_some() {
            return Err(Error::Runtime("text already applied".to_string()));
        }
        let node = &mut drive.nodes[self.idx];
        node.text_md5 = Some(md5_hex(contents));
        let command = EditCommand::ApplyText {
            file_token: node.token.clone(),
            base_checksum: base_checksum.map(str::to_string),
            contents: contents.to_vec(),
        };
        drive.commands.push(command);
        Ok(())
    }

    pub fn modify(&mut self, contents: &[u8]) -> Result<(), Error> {
        self.apply_text(None, contents)
    }

    /// Sets a property; `None` deletes it.
    pub fn change_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), Error> {
        let mut drive = lock_drive(&self.drive);
        let token = drive.check_open(self.idx)?.token.clone();
        drive.commands.push(EditCommand::ChangeFileProp {
            file_token: token,
            name: name.to_string(),
            value: value.map(<[u8]>::to_vec),
        });
        Ok(())
    }

    /// Closes the file. Without an explicit checksum, the MD5 of the applied
    /// text (if any) is sent.
    pub fn close(&mut self, text_checksum: Option<&str>) -> Result<(), Error> {
        let mut drive = lock_drive(&self.drive);
        drive.check_open(self.idx)?;
        drive.close_node(self.idx, text_checksum.map(str::to_string));
        Ok(())
    }
}
