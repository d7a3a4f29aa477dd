//! Bridge WASM <-> JavaScript trung lập framework cho tài liệu LCKB.
//!
//! Trạng thái giữ trong `LckbDocument`; phía JS chỉ trao đổi JSON thuần.

use chrono::Utc;
use lckb_core::{ClinicalDocument, LckbConfig, LckbError, PeriodGranularity};
use lckb_engine::{codec, ClinicalEvent, DocumentUpdater, MemoryUpdate, WriteBackResult};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

/// Ghi đè một phần cấu hình; trường vắng mặt giữ giá trị mặc định.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct JsLckbConfig {
    #[serde(default)]
    max_active_observations: Option<usize>,
    #[serde(default)]
    key_findings_max: Option<usize>,
    #[serde(default)]
    conversation_window: Option<usize>,
    #[serde(default)]
    dictation_cap: Option<usize>,
    #[serde(default)]
    supersede_after_hours: Option<i64>,
    #[serde(default)]
    period_granularity: Option<PeriodGranularity>,
}

impl From<JsLckbConfig> for LckbConfig {
    fn from(cfg: JsLckbConfig) -> Self {
        let mut base = LckbConfig::default();
        if let Some(max) = cfg.max_active_observations {
            base.max_active_observations = max;
        }
        if let Some(max) = cfg.key_findings_max {
            base.key_findings_max = max;
        }
        if let Some(window) = cfg.conversation_window {
            base.conversation_window = window;
        }
        if let Some(cap) = cfg.dictation_cap {
            base.dictation_cap = cap;
        }
        if let Some(hours) = cfg.supersede_after_hours {
            base.supersede_after_hours = hours;
        }
        if let Some(granularity) = cfg.period_granularity {
            base.period_granularity = granularity;
        }
        base
    }
}

fn parse_config(config: Option<JsValue>) -> Result<LckbConfig, JsValue> {
    match config {
        Some(js_cfg) if !js_cfg.is_undefined() && !js_cfg.is_null() => {
            let cfg: JsLckbConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?;
            Ok(LckbConfig::from(cfg))
        }
        _ => Ok(LckbConfig::default()),
    }
}

fn updater_for(config: Option<JsValue>) -> Result<DocumentUpdater, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let config = parse_config(config)?;
    Ok(DocumentUpdater::new(config, Default::default()))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Không serialize kết quả: {err}")))
}

fn format_lckb_error(err: LckbError) -> JsValue {
    JsValue::from_str(&format!("LCKB error: {err}"))
}

/// Tài liệu lâm sàng của một bệnh nhân, sống trong bộ nhớ của trang.
#[wasm_bindgen]
pub struct LckbDocument {
    doc: ClinicalDocument,
    updater: DocumentUpdater,
}

#[wasm_bindgen]
impl LckbDocument {
    #[wasm_bindgen(constructor)]
    pub fn new(patient_id: &str, config: Option<JsValue>) -> Result<LckbDocument, JsValue> {
        let updater = updater_for(config)?;
        Ok(Self {
            doc: ClinicalDocument::create(patient_id, updater.now()),
            updater,
        })
    }

    /// Khôi phục từ chuỗi đã lưu bằng `serialize`.
    pub fn rehydrate(text: &str, config: Option<JsValue>) -> Result<LckbDocument, JsValue> {
        let updater = updater_for(config)?;
        let doc = codec::rehydrate(text, updater.now()).map_err(format_lckb_error)?;
        Ok(Self { doc, updater })
    }

    pub fn serialize(&self) -> Result<String, JsValue> {
        codec::encode(&self.doc, Utc::now()).map_err(format_lckb_error)
    }

    #[wasm_bindgen(js_name = patientId)]
    pub fn patient_id(&self) -> String {
        self.doc.patient_id().to_string()
    }

    /// Toàn bộ tài liệu dưới dạng object JS thuần (chỉ đọc).
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_js(&self.doc)
    }

    /// Nạp một sự kiện JSON có trường `type`; trả về báo cáo nạp.
    #[wasm_bindgen(js_name = applyEvent)]
    pub fn apply_event(&mut self, event: JsValue) -> Result<JsValue, JsValue> {
        let value = from_value::<serde_json::Value>(event)
            .map_err(|err| JsValue::from_str(&format!("Không đọc được sự kiện: {err}")))?;
        let event = ClinicalEvent::from_value(&value, Utc::now()).map_err(format_lckb_error)?;
        let report = self.updater.apply_event(&mut self.doc, event);
        to_js(&report)
    }

    #[wasm_bindgen(js_name = writeBack)]
    pub fn write_back(&mut self, result: JsValue) -> Result<(), JsValue> {
        let result: WriteBackResult = from_value(result)
            .map_err(|err| JsValue::from_str(&format!("Không đọc được kết quả suy luận: {err}")))?;
        self.updater.write_back(&mut self.doc, &result);
        Ok(())
    }

    #[wasm_bindgen(js_name = writeBackMemoryUpdates)]
    pub fn write_back_memory_updates(
        &mut self,
        update: JsValue,
        interaction_type: &str,
        input_summary: &str,
    ) -> Result<JsValue, JsValue> {
        let update: MemoryUpdate = from_value(update)
            .map_err(|err| JsValue::from_str(&format!("Không đọc được cập nhật bộ nhớ: {err}")))?;
        let report = self.updater.write_back_memory_updates(
            &mut self.doc,
            &update,
            interaction_type,
            input_summary,
        );
        to_js(&report)
    }

    #[wasm_bindgen(js_name = markReviewed)]
    pub fn mark_reviewed(&mut self, item: &str) -> bool {
        self.updater.mark_reviewed(&mut self.doc, item).is_inserted()
    }

    #[wasm_bindgen(js_name = resolveConflict)]
    pub fn resolve_conflict(&mut self, id: &str, resolution: &str) -> bool {
        self.updater.resolve_conflict(&mut self.doc, id, resolution)
    }

    /// Xóa bộ nhớ phiên; dữ liệu hồ sơ được giữ lại.
    pub fn reset(&mut self) {
        self.updater.reset(&mut self.doc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_overrides_only_given_fields() {
        let cfg: JsLckbConfig =
            serde_json::from_str(r#"{"maxActiveObservations": 10, "periodGranularity": "week"}"#)
                .unwrap();
        let config = LckbConfig::from(cfg);
        assert_eq!(config.max_active_observations, 10);
        assert_eq!(config.period_granularity, PeriodGranularity::Week);
        assert_eq!(config.key_findings_max, LckbConfig::default().key_findings_max);
    }

    #[test]
    fn empty_override_is_default() {
        assert_eq!(LckbConfig::from(JsLckbConfig::default()), LckbConfig::default());
    }
}
