mod common;

use common::{bbox, car, group_row, image_kind, video_kind, video_row};
use labelspace::geometry::Bitmask;
use labelspace::rle::Mask;
use labelspace::{
    AnswerValue, Binding, ErrorKind, FeatureHash, FrameKey, Geometry, PutOptions,
    Range, SpaceId, SpaceKind,
};

fn video_id() -> SpaceId {
    SpaceId::new("video-1")
}

#[test]
fn overlap_error_then_replace_leaves_three_annotations() {
    let mut row = group_row();
    row.add_space(video_id(), video_kind()).unwrap();
    let hash = car(&mut row);

    let mut space = row.space_mut(&video_id()).unwrap();
    space
        .put_object_instance(&hash, [0u32, 1, 2], bbox(0.1, 0.1), PutOptions::default())
        .unwrap();

    let err = space
        .put_object_instance(&hash, 1u32, bbox(0.5, 0.5), PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverlapConflict);
    assert!(err.to_string().contains("OverlapStrategy::Replace"));

    space
        .put_object_instance(&hash, 1u32, bbox(0.5, 0.5), PutOptions::replace())
        .unwrap();
    let annotations = space.get_object_instance_annotations(Some(&[hash.clone()][..]));
    assert_eq!(annotations.len(), 3);
    let at_one = annotations
        .iter()
        .find(|a| a.key() == FrameKey::Frame(1))
        .unwrap();
    assert_eq!(at_one.geometry(), &bbox(0.5, 0.5));
}

#[test]
fn two_entities_share_a_frame() {
    let mut row = group_row();
    row.add_space(video_id(), video_kind()).unwrap();
    let first = car(&mut row);
    let second = car(&mut row);

    let mut space = row.space_mut(&video_id()).unwrap();
    space
        .put_object_instance(&first, 4u32, bbox(0.1, 0.1), PutOptions::default())
        .unwrap();
    space
        .put_object_instance(&second, 4u32, bbox(0.4, 0.4), PutOptions::default())
        .unwrap();

    let instances = space.get_object_instances();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].hash(), &first);
    assert_eq!(instances[1].hash(), &second);
}

#[test]
fn binding_exclusivity_follows_placement() {
    let mut row = group_row();
    row.add_space(video_id(), video_kind()).unwrap();
    let hash = car(&mut row);

    row.space_mut(&video_id())
        .unwrap()
        .put_object_instance(&hash, [3u32, 4], bbox(0.1, 0.1), PutOptions::default())
        .unwrap();
    assert!(row.object(&hash).unwrap().is_space_bound());

    let err = row
        .object_mut(&hash)
        .unwrap()
        .set_for_frames(7u32, Some(bbox(0.2, 0.2)), PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BindingConflict);
    assert!(row.object(&hash).unwrap().get_annotation_frames().is_err());
    assert_eq!(
        row.add_object_instance(&hash).unwrap_err().kind(),
        ErrorKind::BindingConflict
    );

    let mut space = row.space_mut(&video_id()).unwrap();
    space.remove_object_instance_from_frames(&hash, 3u32).unwrap();
    space.remove_object_instance_from_frames(&hash, 4u32).unwrap();
    assert_eq!(row.object(&hash).unwrap().binding(), &Binding::Detached);

    row.object_mut(&hash)
        .unwrap()
        .set_for_frames(7u32, Some(bbox(0.2, 0.2)), PutOptions::default())
        .unwrap();
}

#[test]
fn static_answers_are_shared_across_spaces() {
    let mut row = group_row();
    row.add_space(video_id(), video_kind()).unwrap();
    row.add_space("image-1", image_kind()).unwrap();
    let hash = car(&mut row);

    row.space_mut(&video_id())
        .unwrap()
        .put_object_instance(&hash, 0u32, bbox(0.1, 0.1), PutOptions::default())
        .unwrap();
    row.space_mut(&"image-1".into())
        .unwrap()
        .put_object_instance(&hash, 0u32, bbox(0.6, 0.6), PutOptions::default())
        .unwrap();

    let red = AnswerValue::Radio(FeatureHash::new("opt-red"));
    row.object_mut(&hash)
        .unwrap()
        .set_answer(&"attr-colour".into(), red.clone())
        .unwrap();

    for id in [video_id(), SpaceId::new("image-1")] {
        let space = row.space(&id).unwrap();
        let instances = space.get_object_instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].get_answer(&"attr-colour".into()), Some(&red));
    }

    let video = row.space(&video_id()).unwrap();
    let image = row.space(&"image-1".into()).unwrap();
    assert_ne!(
        video.get_object_instance_annotations(None)[0].geometry(),
        image.get_object_instance_annotations(None)[0].geometry()
    );
}

#[test]
fn radio_answer_must_use_an_option_of_the_attribute() {
    let mut row = group_row();
    let hash = car(&mut row);
    let err = row
        .object_mut(&hash)
        .unwrap()
        .set_answer(
            &"attr-colour".into(),
            AnswerValue::Radio(FeatureHash::new("opt-sunny")),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn bitmask_extent_is_checked_on_serialization() {
    let mut row = group_row();
    row.add_space("image-1", image_kind()).unwrap();
    let sky = row.create_entity(&"obj-sky".into()).unwrap();

    let mask = Geometry::Bitmask(Bitmask::from_mask(&Mask::empty(50, 50)));
    row.space_mut(&"image-1".into())
        .unwrap()
        .put_object_instance(&sky, 0u32, mask, PutOptions::default())
        .unwrap();

    let err = row.to_wire_document().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert!(err.to_string().contains("image-1"));

    row.space_mut(&"image-1".into())
        .unwrap()
        .remove_object_instance(&sky)
        .unwrap();
    row.to_wire_document().unwrap();
}

#[test]
fn audio_space_rejects_frame_data_and_dynamic_answers() {
    let mut row = group_row();
    row.add_space("audio-1", SpaceKind::Audio).unwrap();
    let speech = row.create_entity(&"obj-speech".into()).unwrap();
    let audio = SpaceId::new("audio-1");

    row.object_mut(&speech)
        .unwrap()
        .set_for_frames(Range::new(0, 10), None, PutOptions::default())
        .unwrap();
    let err = row
        .space_mut(&audio)
        .unwrap()
        .put_object_instance(&speech, Range::new(0, 10), None, PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedForSpace);
    assert!(err.to_string().contains("frames data"));

    row.object_mut(&speech)
        .unwrap()
        .remove_from_frames(Range::new(0, 10))
        .unwrap();
    let mut space = row.space_mut(&audio).unwrap();
    space
        .put_object_instance(&speech, Range::new(100, 200), None, PutOptions::default())
        .unwrap();

    let err = space
        .put_object_instance(&speech, Range::new(150, 250), None, PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverlapConflict);

    let err = space
        .set_answer_on_frames(&speech, &"attr-speaker".into(), "alice", 0u32)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedForSpace);

    let annotations = space.get_object_instance_annotations(None);
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].geometry(), &Geometry::Range(Range::new(100, 200)));
}

#[test]
fn audio_replace_carves_overlapping_ranges() {
    let mut row = group_row();
    row.add_space("audio-1", SpaceKind::Audio).unwrap();
    let speech = row.create_entity(&"obj-speech".into()).unwrap();
    let mut space = row.space_mut(&"audio-1".into()).unwrap();

    space
        .put_object_instance(&speech, Range::new(0, 100), None, PutOptions::default())
        .unwrap();
    space
        .put_object_instance(&speech, Range::new(40, 60), None, PutOptions::replace())
        .unwrap();

    let keys: Vec<FrameKey> = space
        .get_object_instance_annotations(None)
        .iter()
        .map(|a| a.key())
        .collect();
    assert_eq!(keys.len(), 3);
    for range in [Range::new(0, 40), Range::new(40, 60), Range::new(60, 100)] {
        assert!(keys.contains(&FrameKey::Range(range)), "{range:?} missing");
    }
}

#[test]
fn uninitialised_row_rejects_space_edits() {
    let mut row = labelspace::LabelRow::new(common::ontology(), Default::default());
    assert_eq!(
        row.root_space_mut().unwrap_err().kind(),
        ErrorKind::NotInitialised
    );
    assert_eq!(
        row.add_space(video_id(), video_kind()).unwrap_err().kind(),
        ErrorKind::NotInitialised
    );
}

#[test]
fn dynamic_answers_follow_space_placement() {
    let mut row = group_row();
    row.add_space(video_id(), video_kind()).unwrap();
    let hash = car(&mut row);
    let moving = FeatureHash::new("attr-moving");
    let yes = AnswerValue::Radio(FeatureHash::new("opt-moving-yes"));

    row.object_mut(&hash)
        .unwrap()
        .set_dynamic_answer(&moving, yes.clone(), [0u32, 1, 9])
        .unwrap();
    row.space_mut(&video_id())
        .unwrap()
        .put_object_instance(&hash, [0u32, 1, 2], bbox(0.1, 0.1), PutOptions::default())
        .unwrap();

    // The detached API is closed once the object is on a space.
    assert_eq!(
        row.object(&hash)
            .unwrap()
            .get_dynamic_answers(&moving)
            .unwrap_err()
            .kind(),
        ErrorKind::BindingConflict
    );

    let mut space = row.space_mut(&video_id()).unwrap();
    let answers = space.get_answer_on_frames(&hash, &moving, None).unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].answer, yes);
    assert_eq!(answers[0].ranges, vec![Range::new(0, 2)]);

    // Frame 30 has no annotation and is ignored.
    space
        .set_answer_on_frames(&hash, &moving, yes.clone(), [2u32, 30])
        .unwrap();
    let answers = space.get_answer_on_frames(&hash, &moving, None).unwrap();
    assert_eq!(answers[0].ranges, vec![Range::new(0, 3)]);

    space.remove_answer_from_frame(&hash, &moving, 1).unwrap();
    let answers = space.get_answer_on_frames(&hash, &moving, None).unwrap();
    assert_eq!(answers[0].ranges, vec![Range::new(0, 1), Range::new(2, 3)]);

    space.remove_object_instance(&hash).unwrap();
    let err = space.get_answer_on_frames(&hash, &moving, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BindingConflict);
    assert_eq!(err.to_string(), "This object does not exist on this space.");
}

#[test]
fn classification_is_unique_per_feature_and_frame() {
    let mut row = video_row();
    let first = row.create_entity(&"cls-weather".into()).unwrap();
    let second = row.create_entity(&"cls-weather".into()).unwrap();
    let tags = row.create_entity(&"cls-tags".into()).unwrap();

    let mut root = row.root_space_mut().unwrap();
    root.put_classification_instance(&first, [0u32, 1, 2], PutOptions::default())
        .unwrap();
    root.put_classification_instance(&tags, 1u32, PutOptions::default())
        .unwrap();
    let err = root
        .put_classification_instance(&second, 2u32, PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverlapConflict);

    root.put_classification_instance(&second, 2u32, PutOptions::replace())
        .unwrap();
    assert_eq!(root.get_classification_instance_annotations(None).len(), 4);
    assert_eq!(
        root.get_classification_instance_annotations(Some(&[first.clone()][..]))
            .len(),
        2
    );
}

#[test]
fn root_space_sees_label_row_classifications() {
    let mut row = video_row();
    let attached = row.create_entity(&"cls-weather".into()).unwrap();
    let placed = row.create_entity(&"cls-weather".into()).unwrap();
    row.classification_mut(&attached)
        .unwrap()
        .set_for_frames([0u32, 1], PutOptions::default())
        .unwrap();
    row.add_classification_instance(&attached).unwrap();

    let err = row
        .root_space_mut()
        .unwrap()
        .put_classification_instance(&placed, 0u32, PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverlapConflict);
    assert_eq!(row.classification(&placed).unwrap().binding(), &Binding::Detached);

    row.root_space_mut()
        .unwrap()
        .put_classification_instance(&placed, 0u32, PutOptions::replace())
        .unwrap();
    assert_eq!(
        row.classification(&attached)
            .unwrap()
            .get_annotation_frames()
            .unwrap(),
        vec![FrameKey::Frame(1)]
    );
    assert_eq!(
        row.root_space()
            .unwrap()
            .get_classification_instance_annotations(None)
            .len(),
        1
    );

    // Non-root spaces keep their own uniqueness scope.
    row.add_space(video_id(), video_kind()).unwrap();
    let other = row.create_entity(&"cls-weather".into()).unwrap();
    row.space_mut(&video_id())
        .unwrap()
        .put_classification_instance(&other, 1u32, PutOptions::default())
        .unwrap();
}

#[test]
fn label_row_object_edits_are_bounded() {
    let mut row = video_row();
    let hash = car(&mut row);
    row.object_mut(&hash)
        .unwrap()
        .set_for_frames(0u32, Some(bbox(0.1, 0.1)), PutOptions::default())
        .unwrap();
    row.add_object_instance(&hash).unwrap();

    let err = row
        .object_mut(&hash)
        .unwrap()
        .set_for_frames(500u32, Some(bbox(0.1, 0.1)), PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BindingConflict);

    let err = row
        .set_object_frames(&hash, 500u32, Some(bbox(0.1, 0.1)), PutOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert_eq!(
        row.object(&hash).unwrap().get_annotation_frames().unwrap(),
        vec![FrameKey::Frame(0)]
    );

    row.set_object_frames(&hash, 0u32, Some(bbox(0.3, 0.3)), PutOptions::replace())
        .unwrap();
    row.set_object_frames(&hash, 49u32, Some(bbox(0.3, 0.3)), PutOptions::default())
        .unwrap();
    assert_eq!(
        row.object(&hash).unwrap().get_annotation_frames().unwrap(),
        vec![FrameKey::Frame(0), FrameKey::Frame(49)]
    );
}
