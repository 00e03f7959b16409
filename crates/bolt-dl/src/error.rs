use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(bolt_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("error retrieving '{url}': {source}")]
    #[diagnostic(
        code(bolt_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(bolt_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("error reading response body of '{url}': {source}")]
    #[diagnostic(code(bolt_dl::read))]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error generating tag for '{url}': {source}")]
    #[diagnostic(
        code(bolt_dl::tag),
        help("Check your internet connection or try again later")
    )]
    Tag {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
}

impl DownloadError {
    /// Wraps a transport error for `url`, keeping HTTP status failures distinguishable.
    pub(crate) fn request(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Self::HttpError {
                status,
                url: url.to_string(),
            },
            err => Self::Network {
                url: url.to_string(),
                source: Box::new(err),
            },
        }
    }
}
