//! Email enquiry ingestion
//!
//! Webhook payloads flow through [`FieldNormalizer`], [`HeuristicExtractor`]
//! and, when heuristics are unsure, [`AiFallbackParser`] before the
//! materializer turns them into bookings. [`IngestPipeline`] drives the whole
//! sequence.

pub mod ai_fallback;
pub mod dates;
pub mod forwarded;
pub mod heuristic;
pub mod materializer;
pub mod normalizer;
pub mod patterns;
pub mod pipeline;
pub mod types;

pub use ai_fallback::{AiError, AiFallbackParser, CompletionClient, OpenAiCompatibleClient, RefinedExtraction};
pub use heuristic::HeuristicExtractor;
pub use normalizer::{AliasMatch, FieldNormalizer, NormalizedPayload, RawPayload};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use types::{CanonicalEnvelope, ExtractedFields, FieldValue, HeuristicResult, Precision, Provenance};
