use std::fmt;

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, N2nError>;

/// All errors the denoiser core and its collaborators can produce.
#[derive(Debug)]
pub enum N2nError {
    /// Unknown architecture / loss / activation, bad hyperparameters or an
    /// incompatible checkpoint. Raised when the model is built.
    InvalidConfiguration(String),
    /// A batch is missing a field required by the active mode, or its
    /// fields disagree in shape.
    InvalidInput(String),
    /// A loss or gradient turned non-finite; the step was not applied.
    NumericInstability(String),
    Shape(ndarray::ShapeError),
    Image(image::ImageError),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl N2nError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl fmt::Display for N2nError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NumericInstability(msg) => write!(f, "numeric instability: {msg}"),
            Self::Shape(e) => write!(f, "shape error: {e}"),
            Self::Image(e) => write!(f, "image error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for N2nError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Shape(e) => Some(e),
            Self::Image(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ndarray::ShapeError> for N2nError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<image::ImageError> for N2nError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<serde_json::Error> for N2nError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<std::io::Error> for N2nError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
