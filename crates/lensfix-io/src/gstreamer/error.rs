/// An error type for the GStreamer video backend.
#[derive(thiserror::Error, Debug)]
pub enum VideoError {
    /// An error occurred during GStreamer initialization.
    #[error(transparent)]
    GStreamerError(#[from] gstreamer::glib::Error),

    /// An error occurred during GStreamer downcast of pipeline element.
    #[error("Failed to downcast pipeline")]
    DowncastPipelineError(gstreamer::Element),

    /// An element of the pipeline could not be found by name.
    #[error("Failed to get an element by name")]
    GetElementByNameError,

    /// An error occurred during GStreamer to get the bus.
    #[error("Failed to get the bus")]
    BusError,

    /// An error occurred during GStreamer to set the pipeline state.
    #[error(transparent)]
    SetPipelineStateError(#[from] gstreamer::StateChangeError),

    /// An error occurred during GStreamer to pull a sample or map a buffer.
    #[error(transparent)]
    PullSampleError(#[from] gstreamer::glib::BoolError),

    /// The caps of a sample are missing or incomplete.
    #[error("Failed caps: {0}")]
    GetCapsError(String),

    /// An error occurred during GStreamer to get the buffer from the sample.
    #[error("Failed to get the buffer from the sample")]
    GetBufferError,

    /// An error occurred pushing a buffer or the end of stream.
    #[error(transparent)]
    GstreamerFlowError(#[from] gstreamer::FlowError),

    /// The frame does not match the configured stream.
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),

    /// The bus watcher thread panicked.
    #[error("Failed to join the bus thread")]
    JoinThreadError,

    /// The video holds no decodable frame.
    #[error("The video has no frames")]
    NoFrames,
}
