//! Posting requests and job planning
//!
//! A [`PostRequest`] names paths; [`plan_jobs`] turns it into one [`PostJob`]
//! per file, each with its full, immutable list of [`Article`]s. Delivery
//! state is tracked elsewhere (work queue and aggregator), so a plan can be
//! shared freely between workers.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::article::SubjectTemplate;
use crate::config::{Config, split_groups};
use crate::error::{PostError, PostResult};
use crate::segment::{ByteRange, SegmentPlan, scan_file};

/// Position of a job in the run, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a job's file came from
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobSource {
    /// A file named directly in the request
    File,
    /// A file found directly inside a requested directory
    DirectoryEntry {
        /// The directory named in the request
        directory: PathBuf,
    },
}

/// Aggregate state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum JobStatus {
    /// No article reached a terminal state yet
    Pending,
    /// Some articles posted, the rest not finished
    Partial,
    /// Every article posted
    Success,
    /// At least one article failed permanently, or the job never started
    Failed,
}

/// Delivery state of one article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ArticleStatus {
    /// Waiting in the queue
    Pending,
    /// Taken by a worker
    InFlight,
    /// Accepted by a server
    Succeeded,
    /// Failed permanently
    Failed,
}

impl ArticleStatus {
    /// Whether no further attempt will be made
    pub fn is_terminal(self) -> bool {
        matches!(self, ArticleStatus::Succeeded | ArticleStatus::Failed)
    }
}

/// How subjects are derived
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubjectMode {
    /// One subject for every file of the request
    Explicit(String),
    /// Every path is a directory whose name becomes the subject of its files
    DirectoryName,
}

/// What to post
///
/// # Example
///
/// ```
/// use nntp_poster::{PostRequest, SubjectMode};
///
/// let request = PostRequest::new(vec!["/data/holiday".into()], SubjectMode::DirectoryName)
///     .with_newsgroups("alt.binaries.pictures, alt.binaries.test");
/// assert_eq!(request.newsgroups.as_ref().map(Vec::len), Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PostRequest {
    /// Files or directories, in posting order
    pub paths: Vec<PathBuf>,
    /// Subject source
    pub subject: SubjectMode,
    /// Newsgroups overriding the configured default
    #[cfg_attr(feature = "serde", serde(default))]
    pub newsgroups: Option<Vec<String>>,
}

impl PostRequest {
    /// Create a request that posts to the configured default newsgroup
    pub fn new(paths: Vec<PathBuf>, subject: SubjectMode) -> Self {
        Self {
            paths,
            subject,
            newsgroups: None,
        }
    }

    /// Override the newsgroups with a comma separated list
    #[must_use]
    pub fn with_newsgroups(mut self, groups: &str) -> Self {
        self.newsgroups = Some(split_groups(groups));
        self
    }

    /// Check the request before anything touches the filesystem
    ///
    /// # Errors
    ///
    /// [`PostError::Config`] for an empty path list or a blank explicit subject.
    pub fn validate(&self) -> PostResult<()> {
        if self.paths.is_empty() {
            return Err(PostError::Config("no paths to post".to_string()));
        }
        if let SubjectMode::Explicit(subject) = &self.subject
            && subject.trim().is_empty()
        {
            return Err(PostError::Config("subject must not be empty".to_string()));
        }
        Ok(())
    }
}

/// One article-sized piece of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Article {
    /// Owning job
    pub job: JobId,
    /// Part number, 1-based
    pub part: u32,
    /// Number of parts of the job
    pub total: u32,
    /// Chunk the piece was read from
    pub chunk: u32,
    /// Offset of the first byte in the file
    pub offset: u64,
    /// Number of bytes
    pub len: u64,
    /// CRC32 of the piece, taken when the file was scanned
    pub crc32: u32,
}

impl Article {
    /// Byte range of the piece
    pub fn range(&self) -> ByteRange {
        ByteRange {
            part: self.part,
            chunk: self.chunk,
            offset: self.offset,
            len: self.len,
        }
    }
}

/// One file to post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostJob {
    /// Position in the run
    pub id: JobId,
    /// How the file was named in the request
    pub source: JobSource,
    /// Path of the file
    pub path: PathBuf,
    /// File name used in subjects and `=ybegin name=`
    pub file_name: String,
    /// Subject of every article, minus the part counter
    pub subject: SubjectTemplate,
    /// Target newsgroups
    pub newsgroups: Vec<String>,
    /// Size of the file when it was scanned
    pub file_size: u64,
    /// CRC32 of the whole file
    pub file_crc32: u32,
    /// Articles in part order
    pub articles: Vec<Article>,
}

/// A path that could not be turned into a job
#[derive(Debug)]
pub struct RejectedJob {
    /// Position in the run
    pub id: JobId,
    /// Offending path
    pub path: PathBuf,
    /// Why planning failed
    pub error: PostError,
}

/// Result of planning a request
#[derive(Debug, Default)]
pub struct JobPlan {
    /// Jobs ready to post
    pub jobs: Vec<PostJob>,
    /// Paths that failed before posting
    pub rejected: Vec<RejectedJob>,
}

impl JobPlan {
    /// Number of jobs, rejected ones included
    pub fn len(&self) -> usize {
        self.jobs.len() + self.rejected.len()
    }

    /// Whether the plan holds no job at all
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.rejected.is_empty()
    }

    /// Total number of articles to post
    pub fn article_count(&self) -> usize {
        self.jobs.iter().map(|j| j.articles.len()).sum()
    }
}

/// A file (or an unreadable path) found while expanding the request
struct Entry {
    path: PathBuf,
    source: JobSource,
    base: String,
    position: Option<(usize, usize)>,
    error: Option<PostError>,
}

impl Entry {
    fn failed(path: &Path, source: JobSource, error: PostError) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
            base: String::new(),
            position: None,
            error: Some(error),
        }
    }
}

/// Display name of a path's last component
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Regular files directly inside `dir`, sorted by name
async fn list_directory(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => debug!(path = %path.display(), "skipping non-file directory entry"),
            Err(e) => warn!(path = %path.display(), "cannot stat directory entry: {}", e),
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Expand the request's paths into files, in posting order
async fn expand(request: &PostRequest) -> PostResult<Vec<Entry>> {
    let mut entries = Vec::new();

    match &request.subject {
        SubjectMode::Explicit(subject) => {
            for path in &request.paths {
                let file_error = |source| PostError::File {
                    path: path.clone(),
                    source,
                };
                let meta = match tokio::fs::metadata(path).await {
                    Ok(meta) => meta,
                    Err(e) => {
                        entries.push(Entry::failed(path, JobSource::File, file_error(e)));
                        continue;
                    }
                };
                if !meta.is_dir() {
                    entries.push(Entry {
                        path: path.clone(),
                        source: JobSource::File,
                        base: subject.clone(),
                        position: None,
                        error: None,
                    });
                    continue;
                }
                let source = JobSource::DirectoryEntry {
                    directory: path.clone(),
                };
                match list_directory(path).await {
                    Ok(files) => entries.extend(files.into_iter().map(|file| Entry {
                        path: file,
                        source: source.clone(),
                        base: subject.clone(),
                        position: None,
                        error: None,
                    })),
                    Err(e) => entries.push(Entry::failed(path, source, file_error(e))),
                }
            }

            // The explicit subject is shared by every file of the request
            let count = entries.len();
            if count > 1 {
                for (index, entry) in entries.iter_mut().enumerate() {
                    entry.position = Some((index + 1, count));
                }
            }
        }
        SubjectMode::DirectoryName => {
            for path in &request.paths {
                let source = JobSource::DirectoryEntry {
                    directory: path.clone(),
                };
                let file_error = |source| PostError::File {
                    path: path.clone(),
                    source,
                };
                match tokio::fs::metadata(path).await {
                    Ok(meta) if meta.is_dir() => {}
                    Ok(_) => {
                        return Err(PostError::Config(format!(
                            "{} is not a directory; directory subjects need directories",
                            path.display()
                        )));
                    }
                    Err(e) => {
                        entries.push(Entry::failed(path, source, file_error(e)));
                        continue;
                    }
                }

                let files = match list_directory(path).await {
                    Ok(files) => files,
                    Err(e) => {
                        entries.push(Entry::failed(path, source, file_error(e)));
                        continue;
                    }
                };
                if files.is_empty() {
                    warn!(path = %path.display(), "directory has no files to post");
                }
                let base = display_name(path);
                let count = files.len();
                entries.extend(files.into_iter().enumerate().map(|(index, file)| Entry {
                    path: file,
                    source: source.clone(),
                    base: base.clone(),
                    position: (count > 1).then_some((index + 1, count)),
                    error: None,
                }));
            }
        }
    }

    Ok(entries)
}

/// Segment and checksum one file
async fn plan_job(
    id: JobId,
    entry: Entry,
    config: &Config,
    newsgroups: &[String],
) -> PostResult<PostJob> {
    let meta = tokio::fs::metadata(&entry.path)
        .await
        .map_err(|source| PostError::File {
            path: entry.path.clone(),
            source,
        })?;

    let posting = &config.posting;
    let plan = SegmentPlan::new(
        meta.len(),
        posting.effective_chunk_size(),
        posting.article_size,
    );
    plan.check()?;
    let digest = scan_file(&entry.path, &plan).await?;

    let articles = plan
        .ranges()
        .zip(digest.piece_crcs.iter())
        .map(|(range, &crc32)| Article {
            job: id,
            part: range.part,
            total: plan.total_parts(),
            chunk: range.chunk,
            offset: range.offset,
            len: range.len,
            crc32,
        })
        .collect();

    Ok(PostJob {
        id,
        file_name: display_name(&entry.path),
        source: entry.source,
        path: entry.path,
        subject: SubjectTemplate {
            prefix: posting.subject_prefix.clone(),
            base: entry.base,
            position: entry.position,
        },
        newsgroups: newsgroups.to_vec(),
        file_size: plan.file_size(),
        file_crc32: digest.file_crc32,
        articles,
    })
}

/// Expand, segment and checksum every path of a request
///
/// Paths that cannot be read become [`RejectedJob`]s; they fail on their own
/// without stopping the others.
///
/// # Errors
///
/// [`PostError::Config`] when the request is invalid, no newsgroup is known,
/// or a path given in directory-subject mode is not a directory.
pub async fn plan_jobs(config: &Config, request: &PostRequest) -> PostResult<JobPlan> {
    request.validate()?;
    let newsgroups = match &request.newsgroups {
        Some(groups) => groups.clone(),
        None => config.posting.default_groups(),
    };
    if newsgroups.is_empty() {
        return Err(PostError::Config("no newsgroup to post to".to_string()));
    }

    let mut plan = JobPlan::default();
    for (index, mut entry) in expand(request).await?.into_iter().enumerate() {
        let id = JobId(index);
        if let Some(error) = entry.error.take() {
            warn!(job = %id, path = %entry.path.display(), "cannot post: {}", error);
            plan.rejected.push(RejectedJob {
                id,
                path: entry.path,
                error,
            });
            continue;
        }

        let path = entry.path.clone();
        match plan_job(id, entry, config, &newsgroups).await {
            Ok(job) => {
                debug!(
                    job = %id,
                    path = %job.path.display(),
                    parts = job.articles.len(),
                    "job planned"
                );
                plan.jobs.push(job);
            }
            Err(error) => {
                warn!(job = %id, path = %path.display(), "cannot post: {}", error);
                plan.rejected.push(RejectedJob { id, path, error });
            }
        }
    }

    info!(
        "Planned {} jobs ({} rejected), {} articles",
        plan.len(),
        plan.rejected.len(),
        plan.article_count()
    );
    Ok(plan)
}
