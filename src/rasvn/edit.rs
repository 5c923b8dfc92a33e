use tracing::debug;

use crate::svndiff::{DEFAULT_WINDOW_SIZE, DEFAULT_ZLIB_LEVEL, SvndiffVersion, encode_fulltext};
use crate::types::Revnum;
use crate::SvnError;

use super::conn::RaSvnConnection;
use super::{SvnItem, encode_command};

const MAX_BATCH_BYTES: usize = 256 * 1024;
const MAX_COMMANDS_PER_BATCH: usize = 32;

/// One step of a client-driven (commit) editor drive.
///
/// Paths are relative to the session URL; tokens name the directory or file
/// batons the server keeps for the duration of the edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EditCommand {
    OpenRoot {
        rev: Option<Revnum>,
        token: String,
    },
    DeleteEntry {
        path: String,
        rev: Option<Revnum>,
        dir_token: String,
    },
    AddDir {
        path: String,
        parent_token: String,
        child_token: String,
        copy_from: Option<(String, Revnum)>,
    },
    OpenDir {
        path: String,
        parent_token: String,
        child_token: String,
        rev: Option<Revnum>,
    },
    ChangeDirProp {
        dir_token: String,
        name: String,
        value: Option<Vec<u8>>,
    },
    CloseDir {
        dir_token: String,
    },
    AddFile {
        path: String,
        dir_token: String,
        file_token: String,
        copy_from: Option<(String, Revnum)>,
    },
    OpenFile {
        path: String,
        dir_token: String,
        file_token: String,
        rev: Option<Revnum>,
    },
    /// Full text of a file; sent as `apply-textdelta`, svndiff chunks and
    /// `textdelta-end`.
    ApplyText {
        file_token: String,
        base_checksum: Option<String>,
        contents: Vec<u8>,
    },
    ChangeFileProp {
        file_token: String,
        name: String,
        value: Option<Vec<u8>>,
    },
    CloseFile {
        file_token: String,
        text_checksum: Option<String>,
    },
    CloseEdit,
    AbortEdit,
}

fn copy_from_item(copy_from: Option<&(String, Revnum)>) -> SvnItem {
    match copy_from {
        Some((path, rev)) if *rev >= 0 => SvnItem::List(vec![
            SvnItem::string(path),
            SvnItem::Number(*rev as u64),
        ]),
        _ => SvnItem::List(Vec::new()),
    }
}

fn opt_bytes(value: Option<&Vec<u8>>) -> SvnItem {
    SvnItem::opt_string(value)
}

/// Appends the wire form of `cmd`, one command per line.
pub(crate) fn encode_edit_command(
    cmd: &EditCommand,
    svndiff: SvndiffVersion,
    out: &mut Vec<u8>,
) -> Result<(), SvnError> {
    let mut emit = |name: &str, params: Vec<SvnItem>| {
        encode_command(name, &SvnItem::List(params), out);
        out.push(b'\n');
    };
    match cmd {
        EditCommand::OpenRoot { rev, token } => {
            emit("open-root", vec![SvnItem::opt_revision(*rev), SvnItem::string(token)]);
        }
        EditCommand::DeleteEntry { path, rev, dir_token } => emit(
            "delete-entry",
            vec![
                SvnItem::string(path),
                SvnItem::opt_revision(*rev),
                SvnItem::string(dir_token),
            ],
        ),
        EditCommand::AddDir {
            path,
            parent_token,
            child_token,
            copy_from,
        } => emit(
            "add-dir",
            vec![
                SvnItem::string(path),
                SvnItem::string(parent_token),
                SvnItem::string(child_token),
                copy_from_item(copy_from.as_ref()),
            ],
        ),
        EditCommand::OpenDir {
            path,
            parent_token,
            child_token,
            rev,
        } => emit(
            "open-dir",
            vec![
                SvnItem::string(path),
                SvnItem::string(parent_token),
                SvnItem::string(child_token),
                SvnItem::opt_revision(*rev),
            ],
        ),
        EditCommand::ChangeDirProp { dir_token, name, value } => emit(
            "change-dir-prop",
            vec![SvnItem::string(dir_token), SvnItem::string(name), opt_bytes(value.as_ref())],
        ),
        EditCommand::CloseDir { dir_token } => emit("close-dir", vec![SvnItem::string(dir_token)]),
        EditCommand::AddFile {
            path,
            dir_token,
            file_token,
            copy_from,
        } => emit(
            "add-file",
            vec![
                SvnItem::string(path),
                SvnItem::string(dir_token),
                SvnItem::string(file_token),
                copy_from_item(copy_from.as_ref()),
            ],
        ),
        EditCommand::OpenFile {
            path,
            dir_token,
            file_token,
            rev,
        } => emit(
            "open-file",
            vec![
                SvnItem::string(path),
                SvnItem::string(dir_token),
                SvnItem::string(file_token),
                SvnItem::opt_revision(*rev),
            ],
        ),
        EditCommand::ApplyText {
            file_token,
            base_checksum,
            contents,
        } => {
            let delta = encode_fulltext(svndiff, contents, DEFAULT_ZLIB_LEVEL, DEFAULT_WINDOW_SIZE)?;
            emit(
                "apply-textdelta",
                vec![SvnItem::string(file_token), SvnItem::opt_string(base_checksum.as_ref())],
            );
            emit(
                "textdelta-chunk",
                vec![SvnItem::string(file_token), SvnItem::String(delta)],
            );
            emit("textdelta-end", vec![SvnItem::string(file_token)]);
        }
        EditCommand::ChangeFileProp { file_token, name, value } => emit(
            "change-file-prop",
            vec![SvnItem::string(file_token), SvnItem::string(name), opt_bytes(value.as_ref())],
        ),
        EditCommand::CloseFile {
            file_token,
            text_checksum,
        } => emit(
            "close-file",
            vec![SvnItem::string(file_token), SvnItem::opt_string(text_checksum.as_ref())],
        ),
        EditCommand::CloseEdit => emit("close-edit", Vec::new()),
        EditCommand::AbortEdit => emit("abort-edit", Vec::new()),
    }
    Ok(())
}

/// Writes an editor drive in batches, checking between batches whether the
/// server already gave up on the edit.
pub(crate) async fn send_edit(
    conn: &mut RaSvnConnection,
    commands: &[EditCommand],
    svndiff: SvndiffVersion,
) -> Result<(), SvnError> {
    let mut batch = Vec::new();
    let mut since_poll = 0usize;
    for command in commands {
        if since_poll == 0 {
            check_for_edit_status(conn).await?;
        }
        encode_edit_command(command, svndiff, &mut batch)?;
        since_poll += 1;
        if since_poll >= MAX_COMMANDS_PER_BATCH || batch.len() >= MAX_BATCH_BYTES {
            conn.write_wire_bytes(&batch).await?;
            batch.clear();
            since_poll = 0;
        }
    }
    if !batch.is_empty() {
        conn.write_wire_bytes(&batch).await?;
    }
    debug!(commands = commands.len(), "editor drive sent");
    Ok(())
}

/// Fails if the server has already answered the edit, which only happens
/// when it rejected one of the commands.
async fn check_for_edit_status(conn: &mut RaSvnConnection) -> Result<(), SvnError> {
    if !conn.data_available().await? {
        return Ok(());
    }
    let response = conn.read_command_response().await?;
    response.ensure_success("edit")?;
    Err(SvnError::protocol("Successful edit status returned too soon"))
}
