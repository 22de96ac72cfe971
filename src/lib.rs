#![doc = include_str!("../README.md")]

mod aggregate;
/// Usenet article construction (RFC 5536)
pub mod article;
mod client;
/// NNTP command builders and response parsers
pub mod commands;
mod config;
mod dispatch;
mod error;
mod job;
mod pool;
mod response;
mod retry;
mod runner;
mod segment;
/// yEnc multipart encoding and verification
pub mod yenc;

pub use aggregate::{JobError, JobReport, PostSummary, ResultAggregator, ServerReport};
pub use article::{ArticleBuilder, EncodedArticle, SubjectTemplate};
pub use client::{ConnectionState, NntpConnection};
pub use config::{
    Config, DEFAULT_CHUNK_SIZE, DEFAULT_LINE_LENGTH, MAX_SEGMENT_SIZE, PostingConfig, ServerConfig,
    ServerRegistry, Timeouts, split_groups,
};
pub use dispatch::Spawner;
pub use error::{FailureKind, NntpError, PostError, PostResult, Result};
pub use job::{
    Article, ArticleStatus, JobId, JobPlan, JobSource, JobStatus, PostJob, PostRequest,
    RejectedJob, SubjectMode, plan_jobs,
};
pub use pool::{NntpConnectionManager, PooledSession, ServerPool};
pub use response::{NntpResponse, ResponsePolicy, codes};
pub use retry::RetryConfig;
pub use runner::{post, post_files};
pub use segment::{ByteRange, ByteRanges, FileDigest, SegmentPlan, read_range, scan_file};
pub use yenc::{YencDecoded, decode as yenc_decode, encode_part as yenc_encode};

pub use tokio_util::sync::CancellationToken;
