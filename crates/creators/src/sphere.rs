//! Time-dependent maps for a spherical domain.
//!
//! The sphere is an inner region (a filled cube or an excised hollow),
//! wrapped by shells split at radial partitions. The shape map deforms the
//! blocks around the inner region; the rotation, expansion, and translation
//! maps act on everything, optionally rolling off to zero across the outer
//! shell.

use std::collections::BTreeMap;

use chronomap_core::FunctionsOfTime;
use chronomap_maps::{
    Axis, BlockRegion, Chain, CoordinateMap, CoordinateMapBase, Distorted, Grid, Inertial,
    RotScaleTrans, Shape, SphereTransition, TransitionFunction, Wedge,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    OptionsError,
    options::{
        EXPANSION_NAME, EXPANSION_OUTER_BOUNDARY_NAME, ExpansionMapOptions, MapSource,
        ROTATION_NAME, RotationMapOptions, SHAPE_NAME, SIZE_NAME, ShapeMapSource,
        TRANSLATION_NAME, TranslationMapOptions, expansion_functions_of_time,
        rotation_function_of_time, shape_and_size_functions_of_time,
        translation_function_of_time,
    },
};

/// Wedge directions in the order the sphere lays out its wrapping blocks.
const WEDGE_AXES: [Axis; 6] = [
    Axis::PlusZ,
    Axis::MinusZ,
    Axis::PlusY,
    Axis::MinusY,
    Axis::PlusX,
    Axis::MinusX,
];

pub type GridToDistorted = Box<dyn CoordinateMapBase<Grid, Distorted, 3>>;
pub type DistortedToInertial = Box<dyn CoordinateMapBase<Distorted, Inertial, 3>>;
pub type GridToInertial = Box<dyn CoordinateMapBase<Grid, Inertial, 3>>;

/// Options for every time-dependent map of a sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeDependentMapOptions", into = "RawTimeDependentMapOptions")]
pub struct TimeDependentMapOptions {
    initial_time: f64,
    shape: Option<ShapeMapSource>,
    rotation: Option<MapSource<RotationMapOptions>>,
    expansion: Option<MapSource<ExpansionMapOptions>>,
    translation: Option<MapSource<TranslationMapOptions>>,
    transition_rot_scale_trans: bool,
    built: Option<BuiltMaps>,
}

#[derive(Debug, Clone, PartialEq)]
struct BuiltMaps {
    filled: bool,
    deformed_radius: f64,
    shape_maps: Vec<Shape>,
    inner_rot_scale_trans: RotScaleTrans,
    transition_rot_scale_trans: Option<RotScaleTrans>,
}

impl TimeDependentMapOptions {
    /// # Errors
    ///
    /// Returns an error if no map family is given or the shape map's `l_max`
    /// is below 2.
    pub fn new(
        initial_time: f64,
        shape: Option<ShapeMapSource>,
        rotation: Option<MapSource<RotationMapOptions>>,
        expansion: Option<MapSource<ExpansionMapOptions>>,
        translation: Option<MapSource<TranslationMapOptions>>,
        transition_rot_scale_trans: bool,
    ) -> Result<Self, OptionsError> {
        if shape.is_none() && rotation.is_none() && expansion.is_none() && translation.is_none() {
            return Err(OptionsError::NoMapOptions);
        }
        if let Some(shape) = &shape {
            if shape.l_max() < 2 {
                return Err(OptionsError::LMaxTooSmall {
                    l_max: shape.l_max(),
                });
            }
        }
        Ok(Self {
            initial_time,
            shape,
            rotation,
            expansion,
            translation,
            transition_rot_scale_trans,
            built: None,
        })
    }

    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    pub fn shape(&self) -> Option<&ShapeMapSource> {
        self.shape.as_ref()
    }

    pub fn rotation(&self) -> Option<&MapSource<RotationMapOptions>> {
        self.rotation.as_ref()
    }

    pub fn expansion(&self) -> Option<&MapSource<ExpansionMapOptions>> {
        self.expansion.as_ref()
    }

    pub fn translation(&self) -> Option<&MapSource<TranslationMapOptions>> {
        self.translation.as_ref()
    }

    /// Whether grid points pass through the distorted frame.
    ///
    /// Depends only on the options, so it may be called before
    /// [`build_maps`](Self::build_maps).
    pub fn using_distorted_frame(&self) -> bool {
        self.shape.is_some()
    }

    /// Builds the initial functions of time.
    ///
    /// Every function expires at infinity unless `expirations` names it.
    ///
    /// # Errors
    ///
    /// Returns an error if any family fails to build its functions, or if a
    /// shape map is requested before [`build_maps`](Self::build_maps) has
    /// fixed the deformed radius.
    pub fn create_functions_of_time(
        &self,
        expirations: &BTreeMap<String, f64>,
    ) -> Result<FunctionsOfTime, OptionsError> {
        let expiration = |name: &str| expirations.get(name).copied().unwrap_or(f64::INFINITY);
        let mut result = FunctionsOfTime::new();

        if let Some(shape) = &self.shape {
            let built = self.built.as_ref().ok_or(OptionsError::MapsNotBuilt)?;
            result.merge(shape_and_size_functions_of_time(
                shape,
                self.initial_time,
                expiration(SHAPE_NAME),
                expiration(SIZE_NAME),
                built.deformed_radius,
            )?)?;
        }
        if let Some(expansion) = &self.expansion {
            result.merge(expansion_functions_of_time(
                expansion,
                self.initial_time,
                expiration(EXPANSION_NAME),
            )?)?;
        }
        if let Some(rotation) = &self.rotation {
            result.insert(
                ROTATION_NAME,
                rotation_function_of_time(rotation, self.initial_time, expiration(ROTATION_NAME))?,
            )?;
        }
        if let Some(translation) = &self.translation {
            result.insert(
                TRANSLATION_NAME,
                translation_function_of_time(
                    translation,
                    self.initial_time,
                    expiration(TRANSLATION_NAME),
                )?,
            )?;
        }
        Ok(result)
    }

    /// Builds the shape and rotation-scaling-translation maps for the layout.
    ///
    /// A filled sphere gets one wedge-transition shape map per wrapping block
    /// (twelve when a partition leaves room for the deformation to roll off,
    /// six otherwise). A hollow sphere gets a single shape map whose
    /// deformation falls off from the inner radius.
    ///
    /// # Errors
    ///
    /// Returns an error if a filled sphere's shape transition does not end at
    /// the cube, or there are too few radial partitions for the requested
    /// roll-off of the rotation-scaling-translation map.
    pub fn build_maps(
        &mut self,
        center: Vector3<f64>,
        filled: bool,
        inner_radius: f64,
        radial_partitions: &[f64],
        outer_radius: f64,
    ) -> Result<(), OptionsError> {
        let mut shape_maps = Vec::new();
        let mut deformed_radius = inner_radius;

        if let Some(shape) = &self.shape {
            let l_max = shape.l_max();
            if filled {
                if !shape.transition_ends_at_cube() {
                    return Err(OptionsError::TransitionMustEndAtCube);
                }
                if self.transition_rot_scale_trans && radial_partitions.len() < 2 {
                    return Err(OptionsError::RadialPartitions {
                        required: 2,
                        actual: radial_partitions.len(),
                        purpose: "roll off the RotScaleTrans map around a filled shape map",
                    });
                }
                deformed_radius = radial_partitions.first().copied().unwrap_or(outer_radius);
                let has_rolloff = !radial_partitions.is_empty();
                let rolloff_radius = radial_partitions.get(1).copied().unwrap_or(outer_radius);
                debug!(
                    deformed_radius,
                    has_rolloff, "building wedge transitions for a filled sphere"
                );

                for axis in WEDGE_AXES {
                    let transition =
                        Wedge::new(inner_radius, 0.0, deformed_radius, 1.0, axis, true);
                    shape_maps.push(shape_map(center, l_max, Box::new(transition)));
                }
                if has_rolloff {
                    for axis in WEDGE_AXES {
                        let transition =
                            Wedge::new(deformed_radius, 1.0, rolloff_radius, 1.0, axis, false);
                        shape_maps.push(shape_map(center, l_max, Box::new(transition)));
                    }
                }
            } else {
                let falloff_radius = radial_partitions.first().copied().unwrap_or(outer_radius);
                debug!(
                    inner_radius,
                    falloff_radius, "building sphere transition for a hollow sphere"
                );
                let transition = SphereTransition::new(inner_radius, falloff_radius);
                shape_maps.push(shape_map(center, l_max, Box::new(transition)));
            }
        }

        let outer_shell_inner_radius = radial_partitions.last().copied().unwrap_or(inner_radius);
        let inner_rot_scale_trans = self.rot_scale_trans(
            outer_shell_inner_radius,
            outer_radius,
            BlockRegion::Inner,
        )?;
        let transition_rot_scale_trans = if self.transition_rot_scale_trans {
            if radial_partitions.is_empty() {
                return Err(OptionsError::RadialPartitions {
                    required: 1,
                    actual: 0,
                    purpose: "roll off the RotScaleTrans map in the outer shell",
                });
            }
            Some(self.rot_scale_trans(
                outer_shell_inner_radius,
                outer_radius,
                BlockRegion::Transition,
            )?)
        } else {
            None
        };

        self.built = Some(BuiltMaps {
            filled,
            deformed_radius,
            shape_maps,
            inner_rot_scale_trans,
            transition_rot_scale_trans,
        });
        Ok(())
    }

    fn rot_scale_trans(
        &self,
        inner_radius: f64,
        outer_radius: f64,
        region: BlockRegion,
    ) -> Result<RotScaleTrans, OptionsError> {
        Ok(RotScaleTrans::new(
            self.expansion.as_ref().map(|_| {
                (
                    EXPANSION_NAME.to_string(),
                    EXPANSION_OUTER_BOUNDARY_NAME.to_string(),
                )
            }),
            self.rotation.as_ref().map(|_| ROTATION_NAME.to_string()),
            self.translation.as_ref().map(|_| TRANSLATION_NAME.to_string()),
            inner_radius,
            outer_radius,
            region,
        )?)
    }

    fn built(&self) -> Result<&BuiltMaps, OptionsError> {
        self.built.as_ref().ok_or(OptionsError::MapsNotBuilt)
    }

    /// The shape map for `block`, if the block has one.
    fn block_shape_map(
        &self,
        block: usize,
        is_inner_cube: bool,
    ) -> Result<Option<&Shape>, OptionsError> {
        let built = self.built()?;
        let shape_blocks = if built.filled { 12 } else { 6 };
        if self.shape.is_none() || block >= shape_blocks || is_inner_cube {
            return Ok(None);
        }
        let index = if built.filled { block } else { 0 };
        built
            .shape_maps
            .get(index)
            .map(Some)
            .ok_or(OptionsError::InvalidBlock {
                block,
                blocks: built.shape_maps.len(),
            })
    }

    /// # Errors
    ///
    /// Returns an error if the maps have not been built or `block` has no
    /// shape map in this layout.
    pub fn grid_to_distorted_map(
        &self,
        block: usize,
        is_inner_cube: bool,
    ) -> Result<Option<GridToDistorted>, OptionsError> {
        Ok(self
            .block_shape_map(block, is_inner_cube)?
            .map(|shape| -> GridToDistorted {
                Box::new(CoordinateMap::<Grid, Distorted, _, 3>::new(shape.clone()))
            }))
    }

    /// # Errors
    ///
    /// Returns an error if the maps have not been built or `block` has no
    /// shape map in this layout.
    pub fn distorted_to_inertial_map(
        &self,
        block: usize,
        is_inner_cube: bool,
    ) -> Result<Option<DistortedToInertial>, OptionsError> {
        let rot_scale_trans = self.built()?.inner_rot_scale_trans.clone();
        Ok(self
            .block_shape_map(block, is_inner_cube)?
            .map(|_| -> DistortedToInertial {
                Box::new(CoordinateMap::<Distorted, Inertial, _, 3>::new(rot_scale_trans))
            }))
    }

    /// # Errors
    ///
    /// Returns an error if the maps have not been built or `block` has no
    /// shape map in this layout.
    pub fn grid_to_inertial_map(
        &self,
        block: usize,
        is_outer_shell: bool,
        is_inner_cube: bool,
    ) -> Result<GridToInertial, OptionsError> {
        let built = self.built()?;
        if let Some(shape) = self.block_shape_map(block, is_inner_cube)? {
            return Ok(Box::new(CoordinateMap::<Grid, Inertial, _, 3>::new(
                Chain::new(shape.clone(), built.inner_rot_scale_trans.clone()),
            )));
        }
        let rot_scale_trans = match &built.transition_rot_scale_trans {
            Some(transition) if is_outer_shell => transition.clone(),
            _ => built.inner_rot_scale_trans.clone(),
        };
        Ok(Box::new(CoordinateMap::<Grid, Inertial, _, 3>::new(
            rot_scale_trans,
        )))
    }
}

fn shape_map(center: Vector3<f64>, l_max: usize, transition: Box<dyn TransitionFunction>) -> Shape {
    Shape::new(
        center,
        l_max,
        transition,
        SHAPE_NAME,
        Some(SIZE_NAME.to_string()),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RawTimeDependentMapOptions {
    initial_time: f64,
    #[serde(default)]
    shape_map: Option<ShapeMapSource>,
    #[serde(default)]
    rotation_map: Option<MapSource<RotationMapOptions>>,
    #[serde(default)]
    expansion_map: Option<MapSource<ExpansionMapOptions>>,
    #[serde(default)]
    translation_map: Option<MapSource<TranslationMapOptions>>,
    #[serde(default)]
    transition_rot_scale_trans: bool,
}

impl TryFrom<RawTimeDependentMapOptions> for TimeDependentMapOptions {
    type Error = OptionsError;

    fn try_from(raw: RawTimeDependentMapOptions) -> Result<Self, Self::Error> {
        Self::new(
            raw.initial_time,
            raw.shape_map,
            raw.rotation_map,
            raw.expansion_map,
            raw.translation_map,
            raw.transition_rot_scale_trans,
        )
    }
}

impl From<TimeDependentMapOptions> for RawTimeDependentMapOptions {
    fn from(options: TimeDependentMapOptions) -> Self {
        Self {
            initial_time: options.initial_time,
            shape_map: options.shape,
            rotation_map: options.rotation,
            expansion_map: options.expansion,
            translation_map: options.translation,
            transition_rot_scale_trans: options.transition_rot_scale_trans,
        }
    }
}
