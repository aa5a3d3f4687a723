//! Reference ranges for vital signs and lab values
//!
//! Each [`RecordType`] has a normal range, a display unit and a Chinese label.
//! Body measurements (height, weight, waist) carry a range for input
//! validation only and are never flagged as abnormal.

use serde::Serialize;

use crate::models::record::RecordType;

/// Normal range and presentation data for one record type
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceRange {
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
    pub label: &'static str,
}

const fn range(min: f64, max: f64, unit: &'static str, label: &'static str) -> ReferenceRange {
    ReferenceRange { min, max, unit, label }
}

/// Every record type in declaration order
pub const ALL_RECORD_TYPES: [RecordType; 15] = [
    RecordType::Height,
    RecordType::Weight,
    RecordType::Waist,
    RecordType::SystolicBp,
    RecordType::DiastolicBp,
    RecordType::HeartRate,
    RecordType::FastingGlucose,
    RecordType::PostprandialGlucose,
    RecordType::Hba1c,
    RecordType::TotalCholesterol,
    RecordType::Triglycerides,
    RecordType::Hdl,
    RecordType::Ldl,
    RecordType::Temperature,
    RecordType::BloodOxygen,
];

impl RecordType {
    pub fn reference_range(&self) -> ReferenceRange {
        match self {
            RecordType::Height => range(0.0, 300.0, "cm", "身高"),
            RecordType::Weight => range(0.0, 500.0, "kg", "体重"),
            RecordType::Waist => range(0.0, 200.0, "cm", "腰围"),
            RecordType::SystolicBp => range(90.0, 139.0, "mmHg", "收缩压"),
            RecordType::DiastolicBp => range(60.0, 89.0, "mmHg", "舒张压"),
            RecordType::HeartRate => range(60.0, 100.0, "次/分", "心率"),
            RecordType::FastingGlucose => range(3.9, 6.1, "mmol/L", "空腹血糖"),
            RecordType::PostprandialGlucose => range(3.9, 7.8, "mmol/L", "餐后血糖"),
            RecordType::Hba1c => range(4.0, 6.0, "%", "糖化血红蛋白"),
            RecordType::TotalCholesterol => range(2.8, 5.2, "mmol/L", "总胆固醇"),
            RecordType::Triglycerides => range(0.56, 1.7, "mmol/L", "甘油三酯"),
            RecordType::Hdl => range(1.0, 1.5, "mmol/L", "高密度脂蛋白"),
            RecordType::Ldl => range(0.0, 3.4, "mmol/L", "低密度脂蛋白"),
            RecordType::Temperature => range(36.0, 37.3, "°C", "体温"),
            RecordType::BloodOxygen => range(95.0, 100.0, "%", "血氧饱和度"),
        }
    }

    pub fn label(&self) -> &'static str {
        self.reference_range().label
    }

    /// Body measurements are tracked but never judged
    pub fn is_body_measure(&self) -> bool {
        matches!(self, RecordType::Height | RecordType::Weight | RecordType::Waist)
    }

    /// Whether `value` falls outside the normal range
    pub fn is_abnormal(&self, value: f64) -> bool {
        if self.is_body_measure() {
            return false;
        }
        let range = self.reference_range();
        value < range.min || value > range.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_pressure_bounds_are_inclusive() {
        assert!(!RecordType::SystolicBp.is_abnormal(90.0));
        assert!(!RecordType::SystolicBp.is_abnormal(139.0));
        assert!(RecordType::SystolicBp.is_abnormal(140.0));
        assert!(RecordType::DiastolicBp.is_abnormal(59.9));
    }

    #[test]
    fn test_glucose_flags() {
        assert!(RecordType::FastingGlucose.is_abnormal(7.2));
        assert!(!RecordType::FastingGlucose.is_abnormal(5.0));
        assert!(RecordType::PostprandialGlucose.is_abnormal(3.0));
    }

    #[test]
    fn test_body_measures_never_abnormal() {
        assert!(!RecordType::Weight.is_abnormal(900.0));
        assert!(!RecordType::Height.is_abnormal(-1.0));
        assert!(!RecordType::Waist.is_abnormal(1000.0));
    }

    #[test]
    fn test_labels_and_units() {
        let range = RecordType::Temperature.reference_range();
        assert_eq!(range.unit, "°C");
        assert_eq!(range.label, "体温");
        assert_eq!(RecordType::HeartRate.label(), "心率");
    }

    #[test]
    fn test_all_record_types_have_distinct_labels() {
        let mut labels: Vec<_> = ALL_RECORD_TYPES.iter().map(|t| t.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), ALL_RECORD_TYPES.len());
    }
}
