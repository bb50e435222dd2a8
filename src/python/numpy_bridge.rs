//! Conversions between numpy arrays, JSON values and Rust collections.

use numpy::{PyArray1, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use serde::Serialize;
use serde_json::Value;

/// Copy a 1-D array, accepting non-contiguous views.
pub fn numpy_to_vec_f64(arr: PyReadonlyArray1<f64>) -> Vec<f64> {
    arr.as_array().to_vec()
}

/// Copy a 2-D array into row vectors.
pub fn numpy_to_matrix_f64(arr: PyReadonlyArray2<f64>) -> Vec<Vec<f64>> {
    arr.as_array().rows().into_iter().map(|row| row.to_vec()).collect()
}

pub fn vec_to_numpy_f64<'py>(py: Python<'py>, vec: Vec<f64>) -> &'py PyArray1<f64> {
    PyArray1::from_vec(py, vec)
}

/// Build the Python equivalent of a JSON value.
pub fn json_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Null => py.None(),
        Value::Bool(b) => b.to_object(py),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_object(py),
            None => n.as_f64().unwrap_or(f64::NAN).to_object(py),
        },
        Value::String(s) => s.to_object(py),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.to_object(py)
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key, json_to_py(py, item)?)?;
            }
            dict.to_object(py)
        }
    })
}

/// Serialize any value into plain Python dicts and lists.
pub fn to_py<T: Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let json = serde_json::to_value(value).map_err(|e| PyValueError::new_err(e.to_string()))?;
    json_to_py(py, &json)
}
