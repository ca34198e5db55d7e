use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;

/// Largest image accepted from an upload or a camera frame
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum UploadError {
    #[error("이미지 파일이 비어 있습니다.")]
    Empty,
    #[error("이미지 크기가 너무 큽니다 ({size} bytes, 최대 {max} bytes).")]
    TooLarge { size: usize, max: usize },
    #[error("지원하지 않는 파일 형식입니다: {0}. JPEG 또는 PNG 이미지만 업로드할 수 있습니다.")]
    UnsupportedType(String),
    #[error("이미지를 읽을 수 없습니다: {0}")]
    Undecodable(String),
    #[error("이미지 데이터가 올바른 base64 형식이 아닙니다.")]
    InvalidBase64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
        }
    }
}

/// A validated still image ready to send to the classifier
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub format: ImageKind,
    pub width: u32,
    pub height: u32,
}

impl ImageUpload {
    /// Validate raw image bytes.
    ///
    /// The format is sniffed from the payload; `declared_mime` only rejects
    /// obvious non-images early.
    pub fn from_bytes(bytes: Vec<u8>, declared_mime: Option<&str>) -> Result<Self, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        if let Some(mime) = declared_mime {
            let mime = mime.split(';').next().unwrap_or("").trim().to_lowercase();
            if !mime.is_empty() && !mime.starts_with("image/") && mime != "application/octet-stream" {
                return Err(UploadError::UnsupportedType(mime));
            }
        }

        let format = match image::guess_format(&bytes) {
            Ok(ImageFormat::Jpeg) => ImageKind::Jpeg,
            Ok(ImageFormat::Png) => ImageKind::Png,
            Ok(other) => return Err(UploadError::UnsupportedType(format!("{:?}", other).to_lowercase())),
            Err(_) => return Err(UploadError::UnsupportedType("unknown".to_string())),
        };

        let image_format = match format {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
        };
        let (width, height) = image::io::Reader::with_format(Cursor::new(&bytes), image_format)
            .into_dimensions()
            .map_err(|e| UploadError::Undecodable(e.to_string()))?;

        Ok(Self {
            bytes,
            format,
            width,
            height,
        })
    }

    /// Accepts bare base64 or a `data:image/...;base64,` URL
    pub fn from_base64(data: &str) -> Result<Self, UploadError> {
        let data = data.trim();
        let (declared_mime, payload) = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or(UploadError::InvalidBase64)?;
                let mime = header.split(';').next().unwrap_or("");
                (Some(mime), payload)
            }
            None => (None, data),
        };

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|_| UploadError::InvalidBase64)?;
        Self::from_bytes(bytes, declared_mime)
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CameraError {
    #[error("카메라 접근 권한이 거부되었습니다. 브라우저 설정에서 카메라 권한을 허용해주세요.")]
    Denied,
    #[error("카메라를 찾을 수 없습니다. 카메라가 연결되어 있는지 확인해주세요.")]
    NotFound,
    #[error("카메라 사용이 중단되었습니다. 다시 시도해주세요.")]
    Aborted,
    #[error("카메라에 접근할 수 없습니다: {0}")]
    Unknown(String),
}

impl CameraError {
    /// Map a browser media error name to a variant
    pub fn from_name(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => CameraError::Denied,
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => CameraError::NotFound,
            "AbortError" => CameraError::Aborted,
            _ => CameraError::Unknown(if message.is_empty() {
                name.to_string()
            } else {
                message.to_string()
            }),
        }
    }
}

/// A live media track held open by a camera session
pub trait MediaTrack: Send {
    fn stop(&mut self);
    fn is_live(&self) -> bool;
}

pub trait CameraDevice: Send {
    /// Acquire the camera. Every returned track must be stopped by the caller.
    fn open(&mut self) -> Result<Vec<Box<dyn MediaTrack>>, CameraError>;

    /// Encoded still frame (JPEG or PNG)
    fn grab_frame(&mut self) -> Result<Vec<u8>, CameraError>;
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// An open camera. Tracks are released on capture, cancel, or drop.
pub struct CameraSession<'d> {
    device: &'d mut dyn CameraDevice,
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl<'d> CameraSession<'d> {
    pub fn open(device: &'d mut dyn CameraDevice) -> Result<Self, CameraError> {
        let tracks = device.open()?;
        tracing::debug!("📷 Camera opened with {} track(s)", tracks.len());
        Ok(Self { device, tracks })
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// Grab one frame and release the camera, whether or not the frame was usable
    pub fn capture(mut self) -> Result<ImageUpload, CaptureError> {
        let frame = self.device.grab_frame();
        self.stop_all();
        Ok(ImageUpload::from_bytes(frame?, None)?)
    }

    pub fn cancel(mut self) {
        self.stop_all();
    }

    fn stop_all(&mut self) {
        for track in self.tracks.iter_mut().filter(|t| t.is_live()) {
            track.stop();
        }
    }
}

impl Drop for CameraSession<'_> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
