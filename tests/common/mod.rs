#![allow(dead_code)]

use std::sync::Arc;

use labelspace::label_row::DataType;
use labelspace::{
    EntityHash, Geometry, LabelRow, LabelRowMetadata, MediaSize, Ontology, SpaceKind,
};

pub const ONTOLOGY_JSON: &str = r##"{
    "objects": [
        {
            "name": "Car",
            "color": "#FF0000",
            "shape": "bounding_box",
            "featureNodeHash": "obj-car",
            "attributes": [
                {"name": "Colour", "type": "radio", "featureNodeHash": "attr-colour",
                 "options": [
                    {"label": "Red", "featureNodeHash": "opt-red"},
                    {"label": "Blue", "featureNodeHash": "opt-blue"}
                 ]},
                {"name": "Moving", "type": "radio", "featureNodeHash": "attr-moving", "dynamic": true,
                 "options": [
                    {"label": "Yes", "featureNodeHash": "opt-moving-yes"},
                    {"label": "No", "featureNodeHash": "opt-moving-no"}
                 ]}
            ]
        },
        {"name": "Road", "shape": "polygon", "featureNodeHash": "obj-road"},
        {"name": "Sky", "shape": "bitmask", "featureNodeHash": "obj-sky"},
        {
            "name": "Speech",
            "shape": "audio",
            "featureNodeHash": "obj-speech",
            "attributes": [
                {"name": "Speaker", "type": "text", "featureNodeHash": "attr-speaker"}
            ]
        },
        {"name": "Entity Mention", "shape": "text", "featureNodeHash": "obj-mention"}
    ],
    "classifications": [
        {
            "featureNodeHash": "cls-weather",
            "attributes": [
                {"name": "Weather", "type": "radio", "featureNodeHash": "attr-weather",
                 "options": [
                    {"label": "Sunny", "featureNodeHash": "opt-sunny"},
                    {"label": "Rainy", "featureNodeHash": "opt-rainy"}
                 ]}
            ]
        },
        {
            "featureNodeHash": "cls-tags",
            "attributes": [
                {"name": "Tags", "type": "checklist", "featureNodeHash": "attr-tags",
                 "options": [
                    {"label": "Night", "featureNodeHash": "opt-night"},
                    {"label": "Blurry", "featureNodeHash": "opt-blurry"}
                 ]}
            ]
        }
    ]
}"##;

pub fn ontology() -> Arc<Ontology> {
    Arc::new(Ontology::from_json_str(ONTOLOGY_JSON).expect("fixture ontology parses"))
}

/// An initialised, empty group row.
pub fn group_row() -> LabelRow {
    let mut row = LabelRow::new(
        ontology(),
        LabelRowMetadata {
            label_hash: Some("lr-group".into()),
            data_hash: "dh-group".into(),
            data_title: "group".into(),
            data_type: DataType::Group,
            ..Default::default()
        },
    );
    row.initialise_empty().expect("fresh row initialises");
    row
}

/// An initialised video row of 100x100 pixels and 50 frames.
pub fn video_row() -> LabelRow {
    let mut row = LabelRow::new(
        ontology(),
        LabelRowMetadata {
            label_hash: Some("lr-video".into()),
            data_hash: "dh-video".into(),
            data_title: "clip.mp4".into(),
            data_type: DataType::Video,
            width: Some(100),
            height: Some(100),
            number_of_frames: Some(50),
            ..Default::default()
        },
    );
    row.initialise_empty().expect("fresh row initialises");
    row
}

pub fn video_kind() -> SpaceKind {
    SpaceKind::Video {
        size: MediaSize::new(100, 100),
        number_of_frames: 50,
    }
}

pub fn image_kind() -> SpaceKind {
    SpaceKind::Image {
        size: MediaSize::new(100, 100),
    }
}

pub fn bbox(x: f64, y: f64) -> Geometry {
    Geometry::from(labelspace::geometry::BoundingBox::from_xywh(x, y, 0.2, 0.2))
}

pub fn car(row: &mut LabelRow) -> EntityHash {
    row.create_entity(&"obj-car".into()).expect("car class exists")
}
