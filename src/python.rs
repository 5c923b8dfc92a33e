//! pyo3 host bridge.
//!
//! Converts [`Value`]s to and from Python objects, maps [`Error`] onto
//! Python exceptions and lets Python callables and file-like objects act as
//! [`HostCallable`] and [`HostStream`].

use std::sync::Arc;

use pyo3::create_exception;
use pyo3::exceptions::{
    PyException, PyKeyError, PyKeyboardInterrupt, PyNotImplementedError, PyRuntimeError,
    PyStopIteration, PyTypeError, PyValueError,
};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyBytes, PyDict, PyList, PyString, PyTuple};

use crate::error::Error;
use crate::stream::HostStream;
use crate::value::{HostCallable, HostError, Key, Value};

create_exception!(
    subvert,
    SubversionException,
    PyException,
    "A Subversion failure; args are (message, code)."
);
create_exception!(
    subvert,
    BusyException,
    PyException,
    "The remote access object is running another operation."
);

fn key_into_py<'py>(py: Python<'py>, key: &Key) -> PyResult<Bound<'py, PyAny>> {
    Ok(match key {
        Key::Int(n) => n.into_pyobject(py)?.into_any(),
        Key::Str(s) => PyString::new(py, s).into_any(),
    })
}

/// Builds the Python object for `value`.
pub fn value_into_py<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    Ok(match value {
        Value::None => py.None().into_bound(py),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any(),
        Value::Int(n) => n.into_pyobject(py)?.into_any(),
        Value::Bytes(b) => PyBytes::new(py, b).into_any(),
        Value::Str(s) => PyString::new(py, s).into_any(),
        Value::List(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(value_into_py(py, item)?)?;
            }
            list.into_any()
        }
        Value::Tuple(items) => {
            let items = items
                .iter()
                .map(|item| value_into_py(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyTuple::new(py, items)?.into_any()
        }
        Value::Dict(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key_into_py(py, key)?, value_into_py(py, item)?)?;
            }
            dict.into_any()
        }
    })
}

fn key_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Key> {
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Key::Str(s.to_str()?.to_string()));
    }
    if !obj.is_instance_of::<PyBool>()
        && let Ok(n) = obj.extract::<i64>()
    {
        return Ok(Key::Int(n));
    }
    Err(PyTypeError::new_err(format!(
        "dictionary keys must be str or int, not {}",
        obj.get_type().name()?
    )))
}

/// Reads a Python object into a [`Value`]; unsupported types raise `TypeError`.
pub fn value_from_py(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::None);
    }
    if let Ok(b) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(b.is_true()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Value::Str(s.to_str()?.to_string()));
    }
    if let Ok(b) = obj.downcast::<PyBytes>() {
        return Ok(Value::Bytes(b.as_bytes().to_vec()));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return list.iter().map(|item| value_from_py(&item)).collect::<PyResult<_>>().map(Value::List);
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return tuple.iter().map(|item| value_from_py(&item)).collect::<PyResult<_>>().map(Value::Tuple);
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut map = std::collections::BTreeMap::new();
        for (key, item) in dict.iter() {
            map.insert(key_from_py(&key)?, value_from_py(&item)?);
        }
        return Ok(Value::Dict(map));
    }
    if let Ok(n) = obj.extract::<i64>() {
        return Ok(Value::Int(n));
    }
    Err(PyTypeError::new_err(format!(
        "cannot convert {} to a Subversion value",
        obj.get_type().name()?
    )))
}

/// Re-raises the exception captured in `err`, or else the Python class named
/// by `err.kind`.
pub fn host_error_into_py(err: HostError) -> PyErr {
    if let Some(original) = err.payload().and_then(|payload| (**payload).downcast_ref::<PyErr>()) {
        return Python::with_gil(|py| original.clone_ref(py));
    }
    let message = err.message.clone();
    match err.kind.as_str() {
        "TypeError" => PyTypeError::new_err(message),
        "ValueError" => PyValueError::new_err(message),
        "KeyError" => PyKeyError::new_err(message),
        "RuntimeError" => PyRuntimeError::new_err(message),
        "NotImplementedError" => PyNotImplementedError::new_err(message),
        "StopIteration" => PyStopIteration::new_err(message),
        "KeyboardInterrupt" => PyKeyboardInterrupt::new_err(message),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Captures a Python exception as a [`HostError`]: class name, `str()` and
/// the exception itself.
pub fn host_error_from_py(py: Python<'_>, err: &PyErr) -> HostError {
    let kind = err
        .get_type(py)
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "Exception".to_string());
    HostError::new(kind, err.value(py).to_string()).with_payload(Arc::new(err.clone_ref(py)))
}

impl From<Error> for PyErr {
    fn from(err: Error) -> Self {
        match err {
            Error::Subversion(exc) => SubversionException::new_err((exc.message, exc.code)),
            Error::Host(host) => host_error_into_py(host),
            Error::Type(msg) => PyTypeError::new_err(msg),
            Error::Value(msg) => PyValueError::new_err(msg),
            Error::Runtime(msg) => PyRuntimeError::new_err(msg),
            Error::NotImplemented(msg) => PyNotImplementedError::new_err(msg),
            Error::Busy(msg) => BusyException::new_err(msg),
        }
    }
}

/// A Python callable used as a receiver or callback.
#[derive(Debug)]
pub struct PyCallable(Py<PyAny>);

impl PyCallable {
    pub fn new(callable: Py<PyAny>) -> Self {
        Self(callable)
    }
}

impl HostCallable for PyCallable {
    fn call(&mut self, args: Vec<Value>) -> Result<Value, HostError> {
        Python::with_gil(|py| {
            let run = || -> PyResult<Value> {
                let args = args
                    .iter()
                    .map(|arg| value_into_py(py, arg))
                    .collect::<PyResult<Vec<_>>>()?;
                let result = self.0.bind(py).call1(PyTuple::new(py, args)?)?;
                value_from_py(&result)
            };
            run().map_err(|err| host_error_from_py(py, &err))
        })
    }
}

/// A Python file-like object (`read`, `write`, optional `close`).
#[derive(Debug)]
pub struct PyStream(Py<PyAny>);

impl PyStream {
    pub fn new(file: Py<PyAny>) -> Self {
        Self(file)
    }
}

impl HostStream for PyStream {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, HostError> {
        Python::with_gil(|py| {
            let data = self
                .0
                .bind(py)
                .call_method1("read", (len,))
                .map_err(|err| host_error_from_py(py, &err))?;
            match value_from_py(&data) {
                Ok(Value::Bytes(bytes)) => Ok(bytes),
                Ok(Value::Str(s)) => Ok(s.into_bytes()),
                Ok(other) => Err(HostError::new(
                    "TypeError",
                    format!("read() returned {}, expected bytes", other.type_name()),
                )),
                Err(err) => Err(host_error_from_py(py, &err)),
            }
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HostError> {
        Python::with_gil(|py| {
            self.0
                .bind(py)
                .call_method1("write", (PyBytes::new(py, data),))
                .map(drop)
                .map_err(|err| host_error_from_py(py, &err))
        })
    }

    fn close(&mut self) -> Result<(), HostError> {
        Python::with_gil(|py| {
            let file = self.0.bind(py);
            match file.hasattr("close") {
                Ok(true) => file.call_method0("close").map(drop),
                Ok(false) => Ok(()),
                Err(err) => Err(err),
            }
            .map_err(|err| host_error_from_py(py, &err))
        })
    }
}
