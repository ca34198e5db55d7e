use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::scoring::{score, WeightTable};

/// Where the client is sent when a battery shows up in a scan
pub const BATTERY_REDIRECT_PATH: &str = "/battery-service";

/// Waste category as labelled by the detection backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WasteCategory {
    Plastic,
    Paper,
    Glass,
    Metal,
    Cardboard,
    Biodegradable,
    Can,
    Vinyl,
    Styrofoam,
    Battery,
    Fluorescent,
    BulkyWaste,
    Other,
    /// Label the backend returned that we don't know about (kept verbatim)
    Unknown(String),
}

impl WasteCategory {
    /// Every category the mock classifier may emit
    pub const KNOWN: [WasteCategory; 13] = [
        WasteCategory::Plastic,
        WasteCategory::Paper,
        WasteCategory::Glass,
        WasteCategory::Metal,
        WasteCategory::Cardboard,
        WasteCategory::Biodegradable,
        WasteCategory::Can,
        WasteCategory::Vinyl,
        WasteCategory::Styrofoam,
        WasteCategory::Battery,
        WasteCategory::Fluorescent,
        WasteCategory::BulkyWaste,
        WasteCategory::Other,
    ];

    /// Parse a backend label. Never fails: unrecognised labels become `Unknown`.
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "plastic" => WasteCategory::Plastic,
            "paper" => WasteCategory::Paper,
            "glass" => WasteCategory::Glass,
            "metal" => WasteCategory::Metal,
            "cardboard" => WasteCategory::Cardboard,
            "biodegradable" => WasteCategory::Biodegradable,
            "can" => WasteCategory::Can,
            "vinyl" => WasteCategory::Vinyl,
            "styrofoam" => WasteCategory::Styrofoam,
            "battery" => WasteCategory::Battery,
            "fluorescent" => WasteCategory::Fluorescent,
            "bulky_waste" => WasteCategory::BulkyWaste,
            "other" => WasteCategory::Other,
            _ => WasteCategory::Unknown(label.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WasteCategory::Plastic => "plastic",
            WasteCategory::Paper => "paper",
            WasteCategory::Glass => "glass",
            WasteCategory::Metal => "metal",
            WasteCategory::Cardboard => "cardboard",
            WasteCategory::Biodegradable => "biodegradable",
            WasteCategory::Can => "can",
            WasteCategory::Vinyl => "vinyl",
            WasteCategory::Styrofoam => "styrofoam",
            WasteCategory::Battery => "battery",
            WasteCategory::Fluorescent => "fluorescent",
            WasteCategory::BulkyWaste => "bulky_waste",
            WasteCategory::Other => "other",
            WasteCategory::Unknown(label) => label,
        }
    }

    /// Korean display name shown next to a detection
    pub fn display_name(&self) -> &str {
        match self {
            WasteCategory::Plastic => "플라스틱",
            WasteCategory::Paper => "종이",
            WasteCategory::Glass => "유리병",
            WasteCategory::Metal => "금속",
            WasteCategory::Cardboard => "골판지",
            WasteCategory::Biodegradable => "음식물",
            WasteCategory::Can => "캔",
            WasteCategory::Vinyl => "비닐",
            WasteCategory::Styrofoam => "스티로폼",
            WasteCategory::Battery => "건전지",
            WasteCategory::Fluorescent => "형광등",
            WasteCategory::BulkyWaste => "대형폐기물",
            WasteCategory::Other => "기타",
            WasteCategory::Unknown(label) => label,
        }
    }
}

impl Serialize for WasteCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WasteCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(WasteCategory::parse(&label))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Box shapes seen on the wire: `{x1,..}`, `[x1,y1,x2,y2]` or YOLO's `[[x1,y1,x2,y2]]`
#[derive(Deserialize)]
#[serde(untagged)]
enum BoxWire {
    Object { x1: f64, y1: f64, x2: f64, y2: f64 },
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl BoundingBox {
    fn from_slice(coords: &[f64]) -> Option<Self> {
        match coords {
            [x1, y1, x2, y2, ..] => Some(BoundingBox { x1: *x1, y1: *y1, x2: *x2, y2: *y2 }),
            _ => None,
        }
    }

    /// Lenient conversion from whatever the backend sent; malformed boxes become zeros
    pub fn from_wire(value: &serde_json::Value) -> Self {
        match serde_json::from_value::<BoxWire>(value.clone()) {
            Ok(BoxWire::Object { x1, y1, x2, y2 }) => BoundingBox { x1, y1, x2, y2 },
            Ok(BoxWire::Flat(coords)) => Self::from_slice(&coords).unwrap_or_default(),
            Ok(BoxWire::Nested(rows)) => rows
                .first()
                .and_then(|row| Self::from_slice(row))
                .unwrap_or_default(),
            Err(_) => BoundingBox::default(),
        }
    }
}

/// One classified object instance
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(from = "DetectionWire")]
pub struct Detection {
    pub category: WasteCategory,
    pub confidence: f64,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(category: WasteCategory, confidence: f64, bounding_box: BoundingBox) -> Self {
        Self {
            category,
            confidence: clamp_confidence(confidence),
            bounding_box,
        }
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[derive(Deserialize)]
struct DetectionWire {
    #[serde(alias = "class", default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(rename = "box", alias = "bbox", alias = "bounding_box", default)]
    bounding_box: Option<serde_json::Value>,
}

impl From<DetectionWire> for Detection {
    fn from(wire: DetectionWire) -> Self {
        let category = wire
            .category
            .as_deref()
            .map(WasteCategory::parse)
            .unwrap_or(WasteCategory::Other);
        let bounding_box = wire
            .bounding_box
            .as_ref()
            .map(BoundingBox::from_wire)
            .unwrap_or_default();
        Detection::new(category, wire.confidence.unwrap_or(0.0), bounding_box)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecialMessageKind {
    Battery,
    Other,
    Points,
}

/// Hint attached to a result (chatbot query suggestions, points prompt)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpecialMessage {
    #[serde(rename = "type")]
    pub kind: SpecialMessageKind,
    pub message: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

/// What the client should do with a finished scan
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    BatteryRedirect { redirect: String },
    Claimable { points: u32 },
}

/// All detections from one capture/upload
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScanResult {
    pub scan_id: String,
    pub detections: Vec<Detection>,
    pub total_points: u32,
    /// Detections whose category is worth points
    #[serde(default)]
    pub recyclable_items: u32,
    pub has_battery: bool,
    pub created_at: String,
}

impl ScanResult {
    pub fn from_detections(weights: &WeightTable, detections: Vec<Detection>) -> Self {
        let total_points = score(weights, &detections);
        let recyclable_items = detections
            .iter()
            .filter(|d| weights.weight(&d.category) > 0)
            .count();
        let has_battery = detections
            .iter()
            .any(|d| d.category == WasteCategory::Battery);

        Self {
            scan_id: uuid::Uuid::new_v4().to_string(),
            detections,
            total_points,
            recyclable_items: u32::try_from(recyclable_items).unwrap_or(u32::MAX),
            has_battery,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Points the user may claim. Battery scans are routed elsewhere and claim nothing.
    pub fn claimable_points(&self) -> u32 {
        if self.has_battery {
            0
        } else {
            self.total_points
        }
    }

    pub fn outcome(&self) -> ScanOutcome {
        if self.has_battery {
            ScanOutcome::BatteryRedirect {
                redirect: BATTERY_REDIRECT_PATH.to_string(),
            }
        } else {
            ScanOutcome::Claimable {
                points: self.total_points,
            }
        }
    }

    pub fn special_messages(&self) -> Vec<SpecialMessage> {
        let mut messages = Vec::new();

        if self.has_battery {
            messages.push(SpecialMessage {
                kind: SpecialMessageKind::Battery,
                message: "건전지 수거함 위치가 궁금하시면 '주소+ 건전지 수거함'이라고 검색하세요"
                    .to_string(),
                action: "search_battery_bins".to_string(),
                points: None,
            });
        }

        let needs_fee_lookup = self
            .detections
            .iter()
            .any(|d| matches!(d.category, WasteCategory::BulkyWaste | WasteCategory::Other));
        if needs_fee_lookup {
            messages.push(SpecialMessage {
                kind: SpecialMessageKind::Other,
                message: "종량제 봉투를 사용하시거나 대형폐기물일 경우 '관악구 장롱 수수료'라고 검색하세요"
                    .to_string(),
                action: "search_waste_fees".to_string(),
                points: None,
            });
        }

        let claimable = self.claimable_points();
        if claimable > 0 {
            messages.push(SpecialMessage {
                kind: SpecialMessageKind::Points,
                message: format!(
                    "재활용 가능한 항목 {}개가 감지되었습니다. 적립금을 적립하시겠습니까?",
                    self.recyclable_items
                ),
                action: "add_points".to_string(),
                points: Some(claimable),
            });
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str) -> Detection {
        Detection::new(WasteCategory::parse(label), 0.9, BoundingBox::default())
    }

    #[test]
    fn parse_is_lenient_about_case_and_spacing() {
        assert_eq!(WasteCategory::parse(" Plastic "), WasteCategory::Plastic);
        assert_eq!(WasteCategory::parse("bulky waste"), WasteCategory::BulkyWaste);
        assert_eq!(
            WasteCategory::parse("toaster"),
            WasteCategory::Unknown("toaster".to_string())
        );
    }

    #[test]
    fn detection_accepts_yolo_shape() {
        let raw = serde_json::json!({
            "class": "battery",
            "confidence": 0.87,
            "box": [[1.0, 2.0, 30.0, 40.0]]
        });
        let d: Detection = serde_json::from_value(raw).unwrap();
        assert_eq!(d.category, WasteCategory::Battery);
        assert_eq!(d.bounding_box, BoundingBox { x1: 1.0, y1: 2.0, x2: 30.0, y2: 40.0 });
    }

    #[test]
    fn detection_accepts_object_box_and_category_field() {
        let raw = serde_json::json!({
            "category": "paper",
            "confidence": 0.5,
            "box": {"x1": 1.0, "y1": 1.0, "x2": 2.0, "y2": 2.0}
        });
        let d: Detection = serde_json::from_value(raw).unwrap();
        assert_eq!(d.category, WasteCategory::Paper);
        assert_eq!(d.bounding_box.x2, 2.0);
    }

    #[test]
    fn detection_defaults_missing_fields() {
        let d: Detection = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(d.category, WasteCategory::Other);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.bounding_box, BoundingBox::default());

        let d: Detection = serde_json::from_value(serde_json::json!({
            "class": "glass", "confidence": 3.5, "box": "garbage"
        }))
        .unwrap();
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.bounding_box, BoundingBox::default());
    }

    #[test]
    fn battery_anywhere_routes_to_redirect() {
        let weights = WeightTable::default();
        let scan = ScanResult::from_detections(
            &weights,
            vec![detection("plastic"), detection("battery"), detection("glass")],
        );
        assert!(scan.has_battery);
        assert_eq!(scan.claimable_points(), 0);
        assert_eq!(
            scan.outcome(),
            ScanOutcome::BatteryRedirect { redirect: BATTERY_REDIRECT_PATH.to_string() }
        );
        assert!(scan
            .special_messages()
            .iter()
            .all(|m| m.kind != SpecialMessageKind::Points));
    }

    #[test]
    fn claimable_scan_carries_points_prompt() {
        let weights = WeightTable::default();
        let scan = ScanResult::from_detections(
            &weights,
            vec![detection("plastic"), detection("other")],
        );
        assert_eq!(scan.outcome(), ScanOutcome::Claimable { points: 15 });

        let messages = scan.special_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, SpecialMessageKind::Other);
        assert_eq!(messages[1].points, Some(15));
    }

    #[test]
    fn zero_weight_items_are_not_counted_as_recyclable() {
        let scan = ScanResult::from_detections(
            &WeightTable::default(),
            vec![detection("plastic"), detection("bulky_waste"), detection("fluorescent")],
        );
        assert_eq!(scan.recyclable_items, 1);

        let prompt = scan
            .special_messages()
            .into_iter()
            .find(|m| m.kind == SpecialMessageKind::Points)
            .unwrap();
        assert!(prompt.message.contains("항목 1개"));
        assert_eq!(prompt.points, Some(15));
    }

    #[test]
    fn empty_scan_has_no_messages() {
        let scan = ScanResult::from_detections(&WeightTable::default(), vec![]);
        assert!(scan.is_empty());
        assert_eq!(scan.total_points, 0);
        assert!(scan.special_messages().is_empty());
    }
}
