pub mod acquisition;
pub mod archive;
pub mod assets;
pub mod cancel;
pub mod codec;
pub mod diagnostics;
pub mod export;
pub mod fetcher;
pub mod fixtures;
pub mod model;
mod process;
pub mod registry;
pub mod spectrogram;
pub mod storage;
pub mod time;

pub use acquisition::{AcquisitionError, AcquisitionManager, AcquisitionPolicy, UploadedFile};
pub use assets::{
    AudioFileEntry, SUPPORTED_AUDIO_EXTENSIONS, UnsupportedFormatError, scan_audio_files,
};
pub use cancel::{CancelOnDrop, Cancellation};
pub use codec::{
    AudioCodec, CanonicalFormat, DecodeError, DefaultCodec, EncodeError, OutputFormat,
};
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_with_file_prefix, init_tracing_with_options,
};
pub use export::{
    ClipDescriptor, ClipLocation, DataItem, DataItemKind, Delivery, ExportArchive, ExportFailure,
    ExportFailureKind, ExportOptions, ExportOutcome, ExportReport, ExportRequest, ExportResult,
    ExportStage, InvalidRegionError, RegionExporter, validate_region,
};
pub use fetcher::{FetchError, FetchFailureKind, FetchedMedia, MediaFetcher, YtDlpFetcher};
pub use model::{Pcm, PcmSlice, Region, Track, TrackId, TrackOrigin, TrackSummary};
pub use registry::{RegistryPolicy, TrackRegistry};
pub use spectrogram::{
    Colormap, Normalization, RenderError, RenderedSpectrogram, Spectrogram, SpectrogramCache,
    SpectrogramConfig, SpectrogramInfo,
};
pub use storage::{DirectoryObjectStore, ObjectStore, StorageError};
