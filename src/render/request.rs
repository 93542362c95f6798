use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

/// Chart container the book list renders once Highcharts has attached.
pub const DEFAULT_MARKER_SELECTOR: &str = ".highcharts-container";

/// Which front-end view to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// `/books`, which carries the books-per-genre chart
    BookList,
    /// `/books/{id}`, text only
    BookDetail(NonZeroU32),
}

impl RenderTarget {
    /// `None` for id 0
    pub fn book_detail(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(RenderTarget::BookDetail)
    }

    /// Resource kind used in file names and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RenderTarget::BookList => "books-list",
            RenderTarget::BookDetail(_) => "book-detail",
        }
    }

    pub fn id(&self) -> Option<u32> {
        match self {
            RenderTarget::BookList => None,
            RenderTarget::BookDetail(id) => Some(id.get()),
        }
    }

    /// Path relative to the front-end origin, without a leading slash
    pub fn relative_path(&self) -> String {
        match self {
            RenderTarget::BookList => "books".to_string(),
            RenderTarget::BookDetail(id) => format!("books/{}", id),
        }
    }

    /// Whether the page renders a chart asynchronously after its data fetch
    pub fn expects_chart(&self) -> bool {
        matches!(self, RenderTarget::BookList)
    }
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{} #{}", self.kind(), id),
            None => f.write_str(self.kind()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("invalid frontend url: {0}")]
    Parse(#[from] url::ParseError),

    #[error("frontend url must be http or https, got {0}")]
    UnsupportedScheme(String),
}

/// Base origin of the front end whose pages are captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendOrigin(Url);

impl FrontendOrigin {
    pub fn parse(raw: &str) -> Result<Self, OriginError> {
        let mut url = Url::parse(raw.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OriginError::UnsupportedScheme(url.scheme().to_string()));
        }

        // A trailing slash makes `join` append instead of replacing the last segment.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self(url))
    }

    /// Absolute URL of `target` under this origin
    pub fn resolve(&self, target: &RenderTarget) -> Result<Url, OriginError> {
        Ok(self.0.join(&target.relative_path())?)
    }
}

impl fmt::Display for FrontendOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Time budgets and heuristic delays for one render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTimings {
    /// Navigation plus network idle
    pub navigation_timeout: Duration,
    /// Marker wait, chart pages only
    pub readiness_timeout: Duration,
    /// Grace period for pages without a readiness signal
    pub settle_delay: Duration,
    /// Applied after every readiness strategy to absorb late paint and
    /// layout. A heuristic; under heavy load it can still be too short.
    pub post_ready_delay: Duration,
    pub marker_selector: String,
}

impl Default for RenderTimings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            readiness_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(2),
            post_ready_delay: Duration::from_secs(1),
            marker_selector: DEFAULT_MARKER_SELECTOR.to_string(),
        }
    }
}

/// One capture call. Immutable once built.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    target: RenderTarget,
    target_url: Url,
    expects_chart: bool,
    timings: RenderTimings,
}

impl RenderRequest {
    /// Request with default timings; chart expectation follows the target.
    pub fn new(target: RenderTarget, target_url: Url) -> Self {
        Self {
            expects_chart: target.expects_chart(),
            target,
            target_url,
            timings: RenderTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: RenderTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn expecting_chart(mut self, expects_chart: bool) -> Self {
        self.expects_chart = expects_chart;
        self
    }

    pub fn target(&self) -> RenderTarget {
        self.target
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn expects_chart(&self) -> bool {
        self.expects_chart
    }

    pub fn timings(&self) -> &RenderTimings {
        &self.timings
    }
}
