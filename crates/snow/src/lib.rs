//! Roof snow simulation core.
//!
//! Accumulated snow lives on [`SurfaceSnowField`]s as point samples. Strikes
//! break it off into physically simulated [`Clump`]s, either one at a time or
//! as a timed avalanche sweep, and settled clumps are absorbed by an optional
//! [`GroundSink`]. [`SnowScene`] owns all of it and is driven one frame at a
//! time.

pub mod block;
pub mod cascade;
pub mod clump;
pub mod cornice;
pub mod error;
pub mod particles;
pub mod scene;
pub mod shape;
pub mod sink;
pub mod surface;
pub mod tuning;

pub use block::{BlockHit, BlockPiece, SnowBlock, SnowBlockConfig};
pub use cascade::{
    classify, CascadeSequence, RejectReason, SequenceKind, SequenceStep, SequenceSummary, StrikeKind, StrikeOutcome,
};
pub use clump::{Clump, ClumpContext, ClumpElement, ClumpSpawn, ClumpState, ClumpStep, Emission, SettleStyle};
pub use cornice::{CorniceLayout, CorniceManager, CorniceSegment};
pub use error::{Result, SnowError};
pub use particles::{ParticleHandle, ParticleStore, SnowParticle};
pub use scene::{FrameReport, SnowScene, StrikeTarget};
pub use shape::{ClumpBlueprint, FootprintProfile, ShapeFamily};
pub use sink::GroundSink;
pub use surface::{DownhillAxis, PanelAxis, SurfaceConfig, SurfaceSnowField};
pub use tuning::SnowTuning;
