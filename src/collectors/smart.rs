use crate::health::evaluator::{evaluate_all, RawAttribute, ThresholdTable};
use crate::health::tracker::OverrideMode;
use crate::models::device::{Device, DeviceType};
use crate::models::status::TestStatus;
use serde_json::Value;
use std::process::Command;

/// NVMe health log fields handed to the evaluator, by threshold id.
const NVME_FIELDS: [(&str, &str); 5] = [
    ("critical_warning",  "Critical Warning"),
    ("media_errors",      "Media Errors"),
    ("available_spare",   "Available Spare"),
    ("percentage_used",   "Percentage Used"),
    ("warning_temp_time", "Warning Temp Time"),
];

/// What one `smartctl` query says about a device, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSmart {
    pub model:          Option<String>,
    pub serial:         Option<String>,
    pub kind:           DeviceType,
    pub capacity_bytes: u64,
    pub attributes:     Vec<RawAttribute>,
    /// Most recent self-test result, when the device logged one.
    pub self_test:      Option<TestStatus>,
    /// Drive's own overall health assessment.
    pub passed:         Option<bool>,
    pub temperature_c:  Option<f64>,
}

/// Run `smartctl --json=c -a <path>` and parse the result.
/// Returns None if smartctl is unavailable or printed no usable JSON.
pub fn poll_device(smartctl: &str, path: &str) -> Option<RawSmart> {
    let out = match Command::new(smartctl).args(["--json=c", "-a", path]).output() {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(device = path, "could not run {}: {}", smartctl, e);
            return None;
        }
    };

    // smartctl sets exit status bits for failing attributes too, so parse
    // regardless of the code.
    let v: Value = match serde_json::from_slice(&out.stdout) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(device = path, "unparseable smartctl output: {}", e);
            return None;
        }
    };
    let name = path.rsplit('/').next().unwrap_or(path);
    Some(parse(&v, name))
}

pub fn parse(v: &Value, name: &str) -> RawSmart {
    let rotational = v["rotation_rate"].as_u64().map(|r| r > 0);
    let transport = match v["device"]["protocol"].as_str() {
        Some("NVMe") => Some("nvme"),
        _            => v["device"]["type"].as_str(),
    };

    let mut attributes = parse_ata_attributes(v);
    attributes.extend(parse_nvme_health(v));

    RawSmart {
        model:          v["model_name"].as_str().map(str::to_string),
        serial:         v["serial_number"].as_str().map(str::to_string),
        kind:           DeviceType::infer(name, transport, rotational),
        capacity_bytes: v["user_capacity"]["bytes"].as_u64().unwrap_or(0),
        attributes,
        self_test:      parse_self_test(v),
        passed:         v["smart_status"]["passed"].as_bool(),
        temperature_c:  v["temperature"]["current"].as_f64(),
    }
}

/// Raw counter text for one JSON value; non-numbers pass through verbatim
/// so the evaluator reports them as malformed.
fn raw_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null      => String::new(),
        other            => other.to_string(),
    }
}

fn parse_ata_attributes(v: &Value) -> Vec<RawAttribute> {
    let table = match v["ata_smart_attributes"]["table"].as_array() {
        Some(t) => t,
        None    => return Vec::new(),
    };

    table.iter().filter_map(|entry| {
        let id   = entry["id"].as_u64()?;
        let name = entry["name"].as_str().unwrap_or("Unknown");
        // Some vendors pack several counters into raw.value; raw.string
        // starts with the one smartctl decodes.
        let first = entry["raw"]["string"].as_str().and_then(|s| s.split_whitespace().next());
        let raw = match (first, &entry["raw"]["value"]) {
            (Some(tok), _) if !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()) => tok.to_string(),
            (_, Value::Null) => first.unwrap_or("").to_string(),
            (_, value)       => raw_text(value),
        };
        Some(RawAttribute::new(id.to_string(), name, raw))
    }).collect()
}

fn parse_nvme_health(v: &Value) -> Vec<RawAttribute> {
    let log = &v["nvme_smart_health_information_log"];
    if !log.is_object() { return Vec::new(); }

    NVME_FIELDS
        .iter()
        .filter(|(id, _)| !log[*id].is_null())
        .map(|(id, name)| RawAttribute::new(*id, *name, raw_text(&log[*id])))
        .collect()
}

fn parse_self_test(v: &Value) -> Option<TestStatus> {
    if let Some(code) = v["ata_smart_data"]["self_test"]["status"]["value"].as_u64() {
        return Some(match code >> 4 {
            0          => TestStatus::Cs,
            1 | 2      => TestStatus::Aborted,
            3..=8      => TestStatus::Error,
            15         => TestStatus::Working,
            _          => TestStatus::Unknown,
        });
    }
    let log = &v["nvme_self_test_log"];
    if log["current_self_test_operation"]["value"].as_u64().is_some_and(|op| op != 0) {
        return Some(TestStatus::Working);
    }
    let result = log["table"].get(0)?["self_test_result"]["value"].as_u64()?;
    Some(match result {
        0             => TestStatus::Cs,
        1 | 2 | 3 | 4 | 8 => TestStatus::Aborted,
        5 | 6 | 7     => TestStatus::Error,
        _             => TestStatus::Unknown,
    })
}

impl RawSmart {
    /// Build a device record and run the attribute and self-test checks.
    pub fn into_device(self, name: &str, table: &ThresholdTable, mode: OverrideMode) -> Device {
        let mut dev = Device::new(name, mode);
        let model = self.model.clone().unwrap_or_default();
        let assessment = evaluate_all(self.attributes, &model, table);
        dev.model = self.model;
        dev.serial = self.serial;
        dev.dev_type = self.kind;
        dev.capacity_bytes = self.capacity_bytes;

        if let Err(e) = dev.apply_attributes(assessment) {
            tracing::warn!(device = name, "attribute result not recorded: {}", e);
        }
        let self_test = match (self.self_test, self.passed) {
            (Some(s), _)           => s,
            // no self-test log; fall back to the drive's own assessment
            (None, Some(false))    => TestStatus::Error,
            (None, _)              => TestStatus::NotApplicable,
        };
        if let Err(e) = dev.apply_self_test(self_test) {
            tracing::warn!(device = name, "self-test result not recorded: {}", e);
        }
        dev
    }
}
