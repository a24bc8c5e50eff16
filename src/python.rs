//! Python bindings for the pure raster and table kernels

use crate::core::harmonize::ScaleFactors;
use crate::core::pivot::merge_same_day as merge_row;
use crate::core::quality_mask::{landsat_pixel_valid, sentinel2_pixel_valid};
use crate::types::{SeriesError, WideRow, NODATA};
use ndarray::Zip;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;
use std::collections::BTreeMap;

fn to_py_err(e: SeriesError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
}

fn shape_err(what: &str) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{} arrays must share a shape", what))
}

/// Rescale optical digital numbers: "landsat" (Collection 2) or "sentinel2" (L2A)
#[pyfunction]
fn rescale_optical<'py>(
    py: Python<'py>,
    raw: PyReadonlyArray2<'py, u16>,
    family: &str,
) -> PyResult<&'py PyArray2<f32>> {
    let factors = match family {
        "landsat" => ScaleFactors::landsat_optical(),
        "sentinel2" => ScaleFactors::sentinel2_optical(),
        _ => {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Unknown sensor family: {}",
                family
            )))
        }
    };
    Ok(factors.rescale(&raw.as_array().to_owned()).into_pyarray(py))
}

#[pyfunction]
fn landsat_qa_mask<'py>(
    py: Python<'py>,
    qa_pixel: PyReadonlyArray2<'py, u16>,
    qa_radsat: PyReadonlyArray2<'py, u16>,
) -> PyResult<&'py PyArray2<bool>> {
    let qa_pixel = qa_pixel.as_array();
    let qa_radsat = qa_radsat.as_array();
    if qa_pixel.dim() != qa_radsat.dim() {
        return Err(shape_err("QA"));
    }
    let mask = Zip::from(qa_pixel)
        .and(qa_radsat)
        .map_collect(|&qa, &sat| landsat_pixel_valid(qa, sat));
    Ok(mask.into_pyarray(py))
}

#[pyfunction]
fn sentinel2_qa_mask<'py>(
    py: Python<'py>,
    cloud_prob: PyReadonlyArray2<'py, u16>,
    snow_prob: PyReadonlyArray2<'py, u16>,
    scl: PyReadonlyArray2<'py, u16>,
) -> PyResult<&'py PyArray2<bool>> {
    let cloud = cloud_prob.as_array();
    let snow = snow_prob.as_array();
    let scl = scl.as_array();
    if cloud.dim() != snow.dim() || cloud.dim() != scl.dim() {
        return Err(shape_err("Quality layer"));
    }
    let mask = Zip::from(cloud)
        .and(snow)
        .and(scl)
        .map_collect(|&c, &s, &class| sentinel2_pixel_valid(c, s, class));
    Ok(mask.into_pyarray(py))
}

/// Collapse a `{column: value}` row to one maximum per calendar day
#[pyfunction]
fn merge_same_day(columns: BTreeMap<String, f64>) -> PyResult<BTreeMap<String, f64>> {
    let row = WideRow {
        region_id: String::new(),
        columns,
    };
    merge_row(&row).map(|merged| merged.columns).map_err(to_py_err)
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(rescale_optical, m)?)?;
    m.add_function(wrap_pyfunction!(landsat_qa_mask, m)?)?;
    m.add_function(wrap_pyfunction!(sentinel2_qa_mask, m)?)?;
    m.add_function(wrap_pyfunction!(merge_same_day, m)?)?;
    m.add("NODATA", NODATA)?;
    Ok(())
}
