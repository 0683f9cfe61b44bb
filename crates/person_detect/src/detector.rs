use crate::decode::{decode_scale, scale_output_len};
use crate::error::DetectError;
use crate::nms::non_max_suppress;
use crate::npu::NpuRuntime;
use crate::snapshot::SnapshotArchive;
use common_io::{nv12_frame_len, BoundingBox, Detector, DeviceError};

/// Output scale strides in the order the runtime reports its tensors.
pub const SCALE_STRIDES: [u32; 3] = [8, 16, 32];

/// Everything the detector needs, filled from the `[detect]` config section.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub lib_path: String,
    pub model_path: String,
    pub variant: i32,
    pub net_size: u32,
    pub num_classes: u32,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Three anchor pairs per output scale, ordered like SCALE_STRIDES.
    pub anchors: [[[f32; 2]; 3]; 3],
    pub class_names: Vec<String>,
    /// Archive directory for detection-hit JPEGs; None disables archiving.
    pub archive_dir: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            lib_path: "libnpu_runtime.so".to_string(),
            model_path: "model/person_detect_yolov5n.kmodel".to_string(),
            variant: 0,
            net_size: 640,
            num_classes: 1,
            score_threshold: 0.5,
            nms_threshold: 0.3,
            anchors: [
                [[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
                [[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
                [[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
            ],
            class_names: vec!["person".to_string()],
            archive_dir: Some("./pic".to_string()),
        }
    }
}

/// Person detector over the vendor NPU runtime: the runtime letterboxes and
/// infers, the decode/NMS stages here turn raw tensors into frame-space
/// boxes, and hits are archived as JPEGs when enabled.
pub struct NpuDetector {
    runtime: NpuRuntime,
    net_size: u32,
    num_classes: u32,
    score_threshold: f32,
    nms_threshold: f32,
    anchors: [[[f32; 2]; 3]; 3],
    class_names: Vec<String>,
    archive: Option<SnapshotArchive>,
}

impl NpuDetector {
    pub fn open(cfg: &DetectorConfig) -> Result<Self, DetectError> {
        let runtime = NpuRuntime::open(&cfg.lib_path, &cfg.model_path, cfg.variant)?;
        let archive = match &cfg.archive_dir {
            Some(dir) => Some(SnapshotArchive::create(dir)?),
            None => None,
        };
        Ok(NpuDetector {
            runtime,
            net_size: cfg.net_size,
            num_classes: cfg.num_classes,
            score_threshold: cfg.score_threshold,
            nms_threshold: cfg.nms_threshold,
            anchors: cfg.anchors,
            class_names: cfg.class_names.clone(),
            archive,
        })
    }

    pub fn class_name(&self, class_id: u32) -> &str {
        self.class_names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    fn run_pass(
        &mut self,
        nv12: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectError> {
        let expected = nv12_frame_len(width, height);
        if nv12.len() < expected {
            return Err(DetectError::FrameSizeMismatch { expected, actual: nv12.len() });
        }

        self.runtime.run_nv12(nv12, width, height)?;

        let mut boxes = Vec::new();
        for (index, stride) in SCALE_STRIDES.iter().enumerate() {
            let data = self.runtime.output(index)?;
            let expected = scale_output_len(self.net_size, *stride, self.num_classes);
            if data.len() != expected {
                return Err(DetectError::BadOutputLayout { index, len: data.len(), expected });
            }
            decode_scale(
                data,
                self.net_size,
                *stride,
                &self.anchors[index],
                self.num_classes,
                width,
                height,
                self.score_threshold,
                &mut boxes,
            );
        }
        non_max_suppress(&mut boxes, self.nms_threshold);

        if !boxes.is_empty() {
            if let Some(archive) = &mut self.archive {
                if let Err(e) = archive.archive(nv12, width, height, &boxes) {
                    eprintln!("person_detect: {}", e);
                }
            }
        }
        Ok(boxes)
    }
}

impl Detector for NpuDetector {
    fn detect(
        &mut self,
        nv12: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DeviceError> {
        self.run_pass(nv12, width, height).map_err(Into::into)
    }
}
