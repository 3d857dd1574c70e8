// jansen_shared: linkage model, loop-closure solvers, and gait analysis

pub mod config;
pub mod geometry;
pub mod kinematics;
pub mod kinetics;
pub mod trajectory;

pub use config::{AssemblyModes, Link, LinkLengths, MechanismConfig, MechanismConfigBuilder, SolverSettings};
pub use geometry::{Branch, Joint, Point2D, Vector2D};
pub use kinematics::{
    AccelerationState, JointState, KinematicFrame, KinematicsError, LoopId, VelocityState, frame_at, frame_from,
    solve_accelerations, solve_positions, solve_velocities,
};
pub use kinetics::{KineticSample, KineticSeries, KineticSummary, combine_kinetics, compute_kinetics};
pub use trajectory::{GaitMetrics, PartialFailure, Sample, Trajectories, Trajectory, build_trajectories};
