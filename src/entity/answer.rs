//! Attribute answers, both entity-wide (static) and per frame (dynamic).

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{LabelError, Result};
use crate::frames::{frames_to_ranges, Range};
use crate::ids::FeatureHash;
use crate::ontology::{snake_case, Attribute, AttributeType};

/// The value given to one attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AnswerValue {
    Text(String),
    Numeric(f64),
    /// The selected option.
    Radio(FeatureHash),
    /// The selected options, in selection order.
    Checklist(Vec<FeatureHash>),
}

impl AnswerValue {
    fn type_name(&self) -> &'static str {
        match self {
            AnswerValue::Text(_) => "text",
            AnswerValue::Numeric(_) => "numeric",
            AnswerValue::Radio(_) => "radio",
            AnswerValue::Checklist(_) => "checklist",
        }
    }

    /// Checks the value against the attribute definition and normalises it.
    pub(crate) fn validated(self, attribute: &Attribute) -> Result<Self> {
        let mismatch = |value: &AnswerValue| {
            LabelError::malformed(format!(
                "a {} answer does not fit attribute '{}' of type {:?}",
                value.type_name(),
                attribute.name,
                attribute.kind
            ))
        };
        let unknown_option = |hash: &FeatureHash| {
            LabelError::malformed(format!(
                "option '{hash}' is not part of attribute '{}'",
                attribute.name
            ))
        };
        match (attribute.kind, self) {
            (AttributeType::Text, value @ AnswerValue::Text(_)) => Ok(value),
            (AttributeType::Numeric, AnswerValue::Numeric(n)) if n.is_finite() => {
                Ok(AnswerValue::Numeric(n))
            }
            (AttributeType::Numeric, AnswerValue::Numeric(n)) => Err(LabelError::malformed(
                format!("numeric answer {n} for attribute '{}' is not finite", attribute.name),
            )),
            (AttributeType::Radio, AnswerValue::Radio(option)) => match attribute.option(&option) {
                Some(_) => Ok(AnswerValue::Radio(option)),
                None => Err(unknown_option(&option)),
            },
            (AttributeType::Checklist, AnswerValue::Checklist(options)) => {
                let mut selected: Vec<FeatureHash> = Vec::with_capacity(options.len());
                for option in options {
                    if attribute.option(&option).is_none() {
                        return Err(unknown_option(&option));
                    }
                    if !selected.contains(&option) {
                        selected.push(option);
                    }
                }
                Ok(AnswerValue::Checklist(selected))
            }
            (_, value) => Err(mismatch(&value)),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

impl From<f64> for AnswerValue {
    fn from(value: f64) -> Self {
        AnswerValue::Numeric(value)
    }
}

/// An answer plus whether a human gave it.
#[derive(Clone, Debug, PartialEq)]
pub struct Answer {
    pub value: AnswerValue,
    pub manual_annotation: bool,
}

impl Answer {
    pub fn manual(value: AnswerValue) -> Self {
        Self {
            value,
            manual_annotation: true,
        }
    }
}

/// One answer and every range of frames it holds on.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAnswer {
    pub answer: AnswerValue,
    pub ranges: Vec<Range>,
}

/// Entity-wide answers keyed by attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct StaticAnswers(BTreeMap<FeatureHash, Answer>);

impl StaticAnswers {
    pub(crate) fn set(&mut self, attribute: &Attribute, value: AnswerValue, manual: bool) -> Result<()> {
        if attribute.dynamic {
            return Err(LabelError::malformed(format!(
                "attribute '{}' is dynamic and is answered per frame; use \
                 ObjectInstance::set_dynamic_answer or SpaceMut::set_answer_on_frames instead",
                attribute.name
            )));
        }
        let value = value.validated(attribute)?;
        self.0.insert(
            attribute.feature_hash.clone(),
            Answer {
                value,
                manual_annotation: manual,
            },
        );
        Ok(())
    }

    pub(crate) fn get(&self, attribute: &FeatureHash) -> Option<&Answer> {
        self.0.get(attribute)
    }

    pub(crate) fn remove(&mut self, attribute: &FeatureHash) -> Option<Answer> {
        self.0.remove(attribute)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&FeatureHash, &Answer)> {
        self.0.iter()
    }
}

/// Per-frame answers keyed by attribute, then frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct DynamicAnswers(BTreeMap<FeatureHash, BTreeMap<u32, Answer>>);

impl DynamicAnswers {
    pub(crate) fn set(
        &mut self,
        attribute: &Attribute,
        value: AnswerValue,
        frames: impl IntoIterator<Item = u32>,
        manual: bool,
    ) -> Result<()> {
        if !attribute.dynamic {
            return Err(LabelError::malformed(format!(
                "attribute '{}' is static; use set_answer instead",
                attribute.name
            )));
        }
        let answer = Answer {
            value: value.validated(attribute)?,
            manual_annotation: manual,
        };
        let frames: Vec<u32> = frames.into_iter().collect();
        if frames.is_empty() {
            return Ok(());
        }
        let per_frame = self.0.entry(attribute.feature_hash.clone()).or_default();
        for frame in frames {
            per_frame.insert(frame, answer.clone());
        }
        Ok(())
    }

    /// Groups the answers on `frames` (or on every frame) by value.
    pub(crate) fn get(&self, attribute: &FeatureHash, frames: Option<&[u32]>) -> Vec<FrameAnswer> {
        let Some(per_frame) = self.0.get(attribute) else {
            return Vec::new();
        };
        let selected: Vec<(u32, &AnswerValue)> = match frames {
            Some(frames) => frames
                .iter()
                .filter_map(|f| per_frame.get(f).map(|a| (*f, &a.value)))
                .collect(),
            None => per_frame.iter().map(|(f, a)| (*f, &a.value)).collect(),
        };
        group_by_answer(selected)
    }

    pub(crate) fn answer_at(&self, attribute: &FeatureHash, frame: u32) -> Option<&Answer> {
        self.0.get(attribute)?.get(&frame)
    }

    pub(crate) fn attributes(&self) -> impl Iterator<Item = &FeatureHash> {
        self.0.keys()
    }

    pub(crate) fn remove(&mut self, attribute: &FeatureHash, frame: u32) -> Option<Answer> {
        let per_frame = self.0.get_mut(attribute)?;
        let removed = per_frame.remove(&frame);
        if per_frame.is_empty() {
            self.0.remove(attribute);
        }
        removed
    }

    /// Drops every answer on the given frames.
    pub(crate) fn remove_frames(&mut self, frames: &[u32]) {
        for per_frame in self.0.values_mut() {
            for frame in frames {
                per_frame.remove(frame);
            }
        }
        self.0.retain(|_, per_frame| !per_frame.is_empty());
    }

    /// Keeps only answers on frames accepted by `keep`.
    pub(crate) fn retain_frames(&mut self, mut keep: impl FnMut(u32) -> bool) {
        for per_frame in self.0.values_mut() {
            per_frame.retain(|frame, _| keep(*frame));
        }
        self.0.retain(|_, per_frame| !per_frame.is_empty());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every (attribute, frame, answer) triple.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&FeatureHash, u32, &Answer)> {
        self.0
            .iter()
            .flat_map(|(attr, per_frame)| per_frame.iter().map(move |(f, a)| (attr, *f, a)))
    }

    pub(crate) fn insert(&mut self, attribute: FeatureHash, frame: u32, answer: Answer) {
        self.0.entry(attribute).or_default().insert(frame, answer);
    }

    pub(crate) fn merge(&mut self, other: DynamicAnswers) {
        for (attribute, per_frame) in other.0 {
            self.0.entry(attribute).or_default().extend(per_frame);
        }
    }
}

fn group_by_answer(selected: Vec<(u32, &AnswerValue)>) -> Vec<FrameAnswer> {
    let mut groups: Vec<(AnswerValue, Vec<u32>)> = Vec::new();
    for (frame, value) in selected {
        match groups.iter_mut().find(|(v, _)| v == value) {
            Some((_, frames)) => frames.push(frame),
            None => groups.push((value.clone(), vec![frame])),
        }
    }
    groups
        .into_iter()
        .map(|(answer, frames)| FrameAnswer {
            answer,
            ranges: frames_to_ranges(frames),
        })
        .collect()
}

/// Writes an answer in the document form shared by object and
/// classification answer lists.
pub(crate) fn answer_to_wire(attribute: &Attribute, answer: &Answer) -> Value {
    let options = |hashes: &[FeatureHash]| {
        hashes
            .iter()
            .filter_map(|h| attribute.option(h))
            .map(|o| json!({ "name": o.label, "value": o.wire_value(), "featureHash": o.feature_hash }))
            .collect::<Vec<_>>()
    };
    let answers = match &answer.value {
        AnswerValue::Text(text) => json!(text),
        AnswerValue::Numeric(n) => json!(n),
        AnswerValue::Radio(option) => json!(options(std::slice::from_ref(option))),
        AnswerValue::Checklist(selected) => json!(options(selected)),
    };
    json!({
        "name": attribute.name,
        "value": snake_case(&attribute.name),
        "featureHash": attribute.feature_hash,
        "answers": answers,
        "manualAnnotation": answer.manual_annotation,
    })
}

/// Reads an answer entry for a known attribute.
pub(crate) fn answer_from_wire(attribute: &Attribute, entry: &Value) -> Result<Answer> {
    let answers = entry.get("answers").ok_or_else(|| {
        LabelError::malformed(format!("answer for '{}' has no 'answers'", attribute.name))
    })?;
    let option_hashes = || -> Result<Vec<FeatureHash>> {
        let list = answers.as_array().ok_or_else(|| {
            LabelError::malformed(format!("answers for '{}' must be a list", attribute.name))
        })?;
        list.iter()
            .map(|o| {
                o.get("featureHash")
                    .and_then(Value::as_str)
                    .map(FeatureHash::new)
                    .ok_or_else(|| LabelError::malformed("option answer is missing 'featureHash'"))
            })
            .collect()
    };
    let value = match attribute.kind {
        AttributeType::Text => AnswerValue::Text(
            answers
                .as_str()
                .ok_or_else(|| LabelError::malformed("text answer must be a string"))?
                .to_string(),
        ),
        AttributeType::Numeric => AnswerValue::Numeric(
            answers
                .as_f64()
                .or_else(|| answers.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| LabelError::malformed("numeric answer must be a number"))?,
        ),
        AttributeType::Radio => {
            let hashes = option_hashes()?;
            let option = hashes.into_iter().next().ok_or_else(|| {
                LabelError::malformed(format!("radio answer for '{}' selects nothing", attribute.name))
            })?;
            AnswerValue::Radio(option)
        }
        AttributeType::Checklist => AnswerValue::Checklist(option_hashes()?),
    };
    Ok(Answer {
        value: value.validated(attribute)?,
        manual_annotation: entry
            .get("manualAnnotation")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::AttributeOption;

    fn radio() -> Attribute {
        Attribute {
            name: "Colour".into(),
            kind: AttributeType::Radio,
            feature_hash: "attr-colour".into(),
            required: false,
            dynamic: true,
            options: vec![
                AttributeOption {
                    label: "Dark Red".into(),
                    value: None,
                    feature_hash: "opt-red".into(),
                    nested: vec![],
                },
                AttributeOption {
                    label: "Blue".into(),
                    value: None,
                    feature_hash: "opt-blue".into(),
                    nested: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_validation_rejects_wrong_type_and_option() {
        let attribute = radio();
        assert!(AnswerValue::Text("red".into()).validated(&attribute).is_err());
        assert!(AnswerValue::Radio("opt-green".into()).validated(&attribute).is_err());
        assert!(AnswerValue::Radio("opt-red".into()).validated(&attribute).is_ok());
    }

    #[test]
    fn test_checklist_deduplicates() {
        let mut attribute = radio();
        attribute.kind = AttributeType::Checklist;
        let value = AnswerValue::Checklist(vec!["opt-red".into(), "opt-blue".into(), "opt-red".into()])
            .validated(&attribute)
            .unwrap();
        assert_eq!(value, AnswerValue::Checklist(vec!["opt-red".into(), "opt-blue".into()]));
    }

    #[test]
    fn test_static_rejects_dynamic_attribute() {
        let mut answers = StaticAnswers::default();
        let err = answers
            .set(&radio(), AnswerValue::Radio("opt-red".into()), true)
            .unwrap_err();
        assert!(err.to_string().contains("set_answer_on_frames"));
    }

    #[test]
    fn test_dynamic_answers_grouped_into_ranges() {
        let attribute = radio();
        let mut answers = DynamicAnswers::default();
        answers
            .set(&attribute, AnswerValue::Radio("opt-red".into()), [0, 1, 2, 7], true)
            .unwrap();
        answers
            .set(&attribute, AnswerValue::Radio("opt-blue".into()), [3, 4], true)
            .unwrap();
        let grouped = answers.get(&attribute.feature_hash, None);
        assert_eq!(
            grouped,
            vec![
                FrameAnswer {
                    answer: AnswerValue::Radio("opt-red".into()),
                    ranges: vec![Range::new(0, 3), Range::new(7, 8)],
                },
                FrameAnswer {
                    answer: AnswerValue::Radio("opt-blue".into()),
                    ranges: vec![Range::new(3, 5)],
                },
            ]
        );

        let only_four = answers.get(&attribute.feature_hash, Some(&[4][..]));
        assert_eq!(only_four.len(), 1);
        assert_eq!(only_four[0].ranges, vec![Range::new(4, 5)]);

        answers.remove_frames(&[0, 1, 2, 7]);
        assert_eq!(answers.get(&attribute.feature_hash, None).len(), 1);
    }

    #[test]
    fn test_radio_wire_form() {
        let attribute = radio();
        let answer = Answer::manual(AnswerValue::Radio("opt-red".into()));
        let wire = answer_to_wire(&attribute, &answer);
        assert_eq!(wire["value"], json!("colour"));
        assert_eq!(
            wire["answers"],
            json!([{"name": "Dark Red", "value": "dark_red", "featureHash": "opt-red"}])
        );
        assert_eq!(answer_from_wire(&attribute, &wire).unwrap(), answer);
    }
}
