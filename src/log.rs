//! Adapting host callables to native log receivers.

use std::collections::VecDeque;

use tracing::debug;

use crate::convert::{changed_paths_to_dict, prop_hash_to_dict};
use crate::error::{host_error, set_pending};
use crate::types::LogEntry;
use crate::value::{HostCallable, Value};
use crate::SvnError;

/// Host arguments for one log entry:
/// `(changed_paths | None, revnum, revprops[, has_children])`.
///
/// `with_kind` adds the node kind to every changed-path tuple.
pub fn log_entry_args(entry: &LogEntry, with_kind: bool, include_merged: bool) -> Vec<Value> {
    let paths = match &entry.changed_paths {
        Some(paths) if !paths.is_empty() => changed_paths_to_dict(paths, with_kind),
        _ => Value::None,
    };
    let mut args = vec![
        paths,
        Value::Int(entry.revision),
        prop_hash_to_dict(Some(&entry.rev_props)),
    ];
    if include_merged {
        args.push(Value::Bool(entry.has_children));
    }
    args
}

/// Wraps a host callback as a native log receiver (`py_svn_log_wrapper`).
///
/// An exception raised by the callback is left pending and reported to the
/// native side as the host marker, so it reaches the caller unchanged.
pub fn log_receiver<'a>(
    callback: &'a mut dyn HostCallable,
    include_merged: bool,
) -> impl FnMut(LogEntry) -> Result<(), SvnError> + 'a {
    move |entry: LogEntry| {
        let args = log_entry_args(&entry, false, include_merged);
        match callback.call(args) {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(rev = entry.revision, error = %err, "log callback raised");
                set_pending(err.into());
                Err(host_error())
            }
        }
    }
}

/// Log entries collected for `iter_log`, as host tuples with node kinds.
#[derive(Debug, Default)]
pub struct LogIterator {
    entries: VecDeque<Value>,
}

impl LogIterator {
    pub(crate) fn new(entries: Vec<LogEntry>, include_merged: bool) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|entry| Value::Tuple(log_entry_args(entry, true, include_merged)))
                .collect(),
        }
    }
}

impl Iterator for LogIterator {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.entries.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.entries.len(), Some(self.entries.len()))
    }
}

impl ExactSizeIterator for LogIterator {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::take_pending;
    use crate::types::{ChangedPath, NodeKind, PropHash};
    use crate::value::HostError;
    use crate::{Error, check_error};

    fn entry(rev: i64, paths: Option<Vec<ChangedPath>>) -> LogEntry {
        let mut rev_props = PropHash::new();
        rev_props.insert("svn:date".into(), b"2024-01-01T00:00:00.000000Z".to_vec());
        LogEntry {
            revision: rev,
            changed_paths: paths,
            rev_props,
            has_children: false,
            subtractive_merge: false,
        }
    }

    fn added(path: &str) -> ChangedPath {
        ChangedPath {
            path: path.into(),
            action: 'A',
            copy_from_path: None,
            copy_from_rev: None,
            node_kind: NodeKind::Dir,
            text_mods: None,
            prop_mods: None,
        }
    }

    #[test]
    fn receiver_passes_three_arguments() {
        let mut seen = Vec::new();
        let mut cb = |args: Vec<Value>| {
            seen.push(args);
            Ok(Value::None)
        };
        {
            let mut receiver = log_receiver(&mut cb, false);
            receiver(entry(0, Some(Vec::new()))).unwrap();
            receiver(entry(1, Some(vec![added("/foo")]))).unwrap();
        }
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[0][0], Value::None);
        assert_eq!(seen[0][1], Value::Int(0));
        let paths = &seen[1][0];
        assert_eq!(
            paths.get("/foo").unwrap(),
            &Value::Tuple(vec![Value::from("A"), Value::None, Value::Int(-1)])
        );
    }

    #[test]
    fn merged_requests_append_has_children() {
        let args = log_entry_args(&entry(3, None), false, true);
        assert_eq!(args.len(), 4);
        assert_eq!(args[3], Value::Bool(false));
    }

    #[test]
    fn callback_exception_propagates_unchanged() {
        let mut cb = |_args: Vec<Value>| Err(HostError::new("KeyError", "rev"));
        let err = {
            let mut receiver = log_receiver(&mut cb, false);
            receiver(entry(1, None)).unwrap_err()
        };
        assert!(err.is_host_marker());
        match check_error::<()>(Err(err)).unwrap_err() {
            Error::Host(h) => assert_eq!(h.kind, "KeyError"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(take_pending().is_none());
    }

    #[test]
    fn iterator_yields_four_tuples_with_node_kind() {
        let mut iter = LogIterator::new(vec![entry(1, Some(vec![added("/foo")]))], false);
        assert_eq!(iter.len(), 1);
        let item = iter.next().unwrap();
        let tuple = item.as_seq().unwrap();
        let kind = &tuple[0].get("/foo").unwrap().as_seq().unwrap()[3];
        assert_eq!(kind, &Value::Int(2));
        assert!(iter.next().is_none());
    }
}
