//! PolePlan core: geodata features, export chain, clearance targets and
//! permit summaries for pole-attachment jobs.

pub mod autofill;
pub mod export;
pub mod geodata;
pub mod lenient;
pub mod models;
pub mod permit;
pub mod spatial;
pub mod targets;

pub use autofill::{autofill_bearings_and_pull, AutofillOptions, AutofillReport};
pub use export::{
    fallback_filename, ConvertedPayload, Converter, ConverterRegistry, DirectorySink, ExportError,
    ExportFormat, ExportOutcome, ExportSink, Exporter, MemorySink, Unavailable,
};
pub use geodata::{
    build_feature_collection, parse_feature_collection, Feature, FeatureCollection, Geometry,
};
pub use models::{AsBuilt, CachedMidspan, EnvSegment, JobMeta, Pole, Span};
pub use permit::{
    make_permit_summary, EngineeringResults, PermitError, PermitSummary, PermitSummaryInput,
    PermitType, TargetSource,
};
pub use targets::{
    controlling_ground_target, get_env_target, max_target_from_cached, ClearanceProfile,
    ProfileError,
};
