//! Laser sensor models for the correction step.
//!
//! A closed set of models dispatched by pattern match. All of them score
//! a subsampled set of beams against the map and multiply the result into
//! each particle's weight; they differ in how the map is consulted.

mod beam;
mod distance_field;
mod likelihood_field;

pub use beam::BeamModel;
pub use distance_field::DistanceField;
pub use likelihood_field::{FieldParams, LikelihoodFieldModel, LikelihoodFieldProbModel};

use crate::config::{LocalizerConfig, SensorModelKind};
use crate::core::types::BeamData;
use crate::filter::Particle;
use crate::map::OccupancyMap;

/// Closed set of laser sensor models.
#[derive(Debug, Clone)]
pub enum SensorModel {
    /// Ray-casting mixture model.
    Beam(BeamModel),
    /// Endpoint distance-field model.
    LikelihoodField(LikelihoodFieldModel),
    /// Endpoint model with probabilistic beam skipping.
    LikelihoodFieldProb(LikelihoodFieldProbModel),
}

impl SensorModel {
    /// Build the model selected by the configuration.
    ///
    /// The likelihood-field variants precompute their distance field from
    /// the map here, which is the expensive part of construction.
    pub fn from_config(config: &LocalizerConfig, map: &OccupancyMap) -> Self {
        match config.sensor_model {
            SensorModelKind::Beam => SensorModel::Beam(BeamModel {
                z_hit: config.z_hit,
                z_short: config.z_short,
                z_max: config.z_max,
                z_rand: config.z_rand,
                sigma_hit: config.sigma_hit,
                lambda_short: config.lambda_short,
            }),
            SensorModelKind::LikelihoodField => {
                SensorModel::LikelihoodField(LikelihoodFieldModel {
                    params: FieldParams {
                        z_hit: config.z_hit,
                        z_rand: config.z_rand,
                        sigma_hit: config.sigma_hit,
                    },
                    field: DistanceField::compute(map, config.likelihood_max_dist as f32),
                })
            }
            SensorModelKind::LikelihoodFieldProb => {
                SensorModel::LikelihoodFieldProb(LikelihoodFieldProbModel {
                    params: FieldParams {
                        z_hit: config.z_hit,
                        z_rand: config.z_rand,
                        sigma_hit: config.sigma_hit,
                    },
                    field: DistanceField::compute(map, config.likelihood_max_dist as f32),
                    do_beamskip: config.do_beamskip,
                    beam_skip_distance: config.beam_skip_distance,
                    beam_skip_threshold: config.beam_skip_threshold,
                    beam_skip_error_threshold: config.beam_skip_error_threshold,
                })
            }
        }
    }

    /// Reweight the particle set against one scan's beam data.
    ///
    /// Returns the total (unnormalized) weight after the update.
    pub fn update_weights(
        &self,
        data: &BeamData,
        particles: &mut [Particle],
        map: &OccupancyMap,
    ) -> f64 {
        match self {
            SensorModel::Beam(model) => model.update_weights(data, particles, map),
            SensorModel::LikelihoodField(model) => model.update_weights(data, particles),
            SensorModel::LikelihoodFieldProb(model) => model.update_weights(data, particles),
        }
    }
}
