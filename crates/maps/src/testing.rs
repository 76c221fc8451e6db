//! Registries shared by the map tests.

use chronomap_core::{FunctionsOfTime, PiecewisePolynomial, QuaternionFunctionOfTime};
use nalgebra::DVector;

pub(crate) fn dv(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

pub(crate) fn polynomial(derivs: &[&[f64]]) -> PiecewisePolynomial<2> {
    PiecewisePolynomial::new(
        0.0,
        derivs.iter().map(|values| dv(values)).collect::<Vec<_>>(),
        f64::INFINITY,
    )
    .expect("valid polynomial")
}

pub(crate) fn rotation_about(omega: [f64; 3]) -> QuaternionFunctionOfTime<2> {
    QuaternionFunctionOfTime::new(
        0.0,
        dv(&[1.0, 0.0, 0.0, 0.0]),
        vec![dv(&[0.0; 3]), dv(&omega), dv(&[0.0; 3])],
        f64::INFINITY,
    )
    .expect("valid rotation")
}

/// Expansion, outer-boundary expansion, rotation, and translation functions.
pub(crate) fn rot_scale_trans_registry() -> FunctionsOfTime {
    let mut functions_of_time = FunctionsOfTime::new();
    functions_of_time
        .insert("Expansion", Box::new(polynomial(&[&[1.1], &[0.05], &[0.0]])))
        .expect("unique name");
    functions_of_time
        .insert(
            "ExpansionOuterBoundary",
            Box::new(polynomial(&[&[0.95], &[-0.02], &[0.0]])),
        )
        .expect("unique name");
    functions_of_time
        .insert("Rotation", Box::new(rotation_about([0.1, 0.2, 0.3])))
        .expect("unique name");
    functions_of_time
        .insert(
            "Translation",
            Box::new(polynomial(&[&[0.1, -0.2, 0.05], &[0.01, 0.02, 0.0], &[0.0; 3]])),
        )
        .expect("unique name");
    functions_of_time
}
