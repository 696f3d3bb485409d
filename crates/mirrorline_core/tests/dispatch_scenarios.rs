//! End-to-end codec and dispatcher scenarios between an authority and a mirror.

use mirrorline_core::protocol::{encode_entities, encode_ids};
use mirrorline_core::{
    EntityContainer, Op, ReplicaError, Replicated, Role, StateSync, SubmessageHeader, TypeTag,
    WireReader, WireWriter, HEADER_SIZE,
};

#[derive(Clone, Debug, PartialEq)]
struct Shot {
    position: [f32; 3],
    velocity: [f32; 3],
}

impl Shot {
    fn moving(vx: f32) -> Self {
        Self {
            position: [0.0; 3],
            velocity: [vx, 0.0, 0.0],
        }
    }
}

impl Replicated for Shot {
    const KIND: &'static str = "scenario.Shot";

    fn encode(&self, writer: &mut WireWriter) {
        for v in self.position.iter().chain(&self.velocity) {
            writer.write_f32(*v);
        }
    }

    fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
        let mut f = [0.0f32; 6];
        for slot in &mut f {
            *slot = reader.read_f32()?;
        }
        Some(Self {
            position: [f[0], f[1], f[2]],
            velocity: [f[3], f[4], f[5]],
        })
    }
}

fn mirror() -> EntityContainer {
    let mut container = EntityContainer::new(Role::Mirror);
    container.register::<Shot>(StateSync::DiffsOnly).unwrap();
    container
}

#[test]
fn test_instantiate_then_update_same_entity() {
    let mut client = mirror();

    let mut writer = WireWriter::new();
    encode_entities(&mut writer, Op::Instantiate, [(5, &Shot::moving(1.0))]);
    let report = client.dispatch(writer.as_slice());
    assert!(report.is_clean());

    let local = client.resolve_remote::<Shot>(5).unwrap();
    assert_eq!(client.storage::<Shot>().unwrap().live_count(), 1);

    writer.reset();
    let mut moved = Shot::moving(1.0);
    moved.position = [3.0, 0.0, 0.0];
    encode_entities(&mut writer, Op::Update, [(5, &moved)]);
    client.dispatch(writer.as_slice());

    let storage = client.storage::<Shot>().unwrap();
    assert_eq!(storage.live_count(), 1);
    assert_eq!(storage.get(local).unwrap(), &moved);
}

#[test]
fn test_unknown_tag_with_empty_payload_consumes_header_only() {
    let mut client = mirror();
    let mut writer = WireWriter::new();
    SubmessageHeader::new(TypeTag::of_name("scenario.Unknown"), Op::Update, 0).write(&mut writer);

    let report = client.dispatch(writer.as_slice());
    assert_eq!(report.consumed, HEADER_SIZE);
    assert_eq!(report.submessages, 1);
    assert_eq!(
        report.errors,
        vec![ReplicaError::UnknownTypeTag(TypeTag::of_name("scenario.Unknown"))]
    );
    assert!(!report.truncated);
}

#[test]
fn test_unknown_tag_skipped_then_known_applied() {
    let mut client = mirror();
    let mut writer = WireWriter::new();
    SubmessageHeader::new(TypeTag(0xDEAD_BEEF), Op::Instantiate, 7).write(&mut writer);
    writer.write_bytes(&[9; 7]);
    encode_entities(&mut writer, Op::Instantiate, [(0, &Shot::moving(2.0))]);

    let report = client.dispatch(writer.as_slice());
    assert_eq!(report.applied, 1);
    assert_eq!(report.consumed, writer.len());
    assert_eq!(client.storage::<Shot>().unwrap().live_count(), 1);
}

#[test]
fn test_truncated_tail_keeps_earlier_submessages() {
    let mut client = mirror();
    let mut writer = WireWriter::new();
    encode_entities(&mut writer, Op::Instantiate, [(1, &Shot::moving(1.0))]);
    writer.write_bytes(&[0; HEADER_SIZE - 3]);

    let report = client.dispatch(writer.as_slice());
    assert!(report.truncated);
    assert_eq!(report.applied, 1);
    assert_eq!(report.consumed, writer.len());
    assert!(matches!(
        report.errors.as_slice(),
        [ReplicaError::MalformedHeader { .. }]
    ));
}

#[test]
fn test_deinstantiate_unknown_id_is_skipped() {
    let mut client = mirror();
    let mut writer = WireWriter::new();
    encode_entities(&mut writer, Op::Instantiate, [(2, &Shot::moving(1.0))]);
    encode_ids(&mut writer, Shot::TAG, [8, 2]);

    let report = client.dispatch(writer.as_slice());
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(client.storage::<Shot>().unwrap().live_count(), 0);
    assert_eq!(client.resolve_remote::<Shot>(2), None);
}

#[test]
fn test_authority_to_mirror_convergence() {
    let mut server = EntityContainer::new(Role::Authority);
    server.register::<Shot>(StateSync::DiffsOnly).unwrap();
    let mut early = mirror();
    let mut late = mirror();

    let storage = server.storage_mut::<Shot>().unwrap();
    let ids: Vec<u32> = (0..6).map(|i| storage.emplace(Shot::moving(i as f32))).collect();
    early.dispatch(&server.encode_tick());

    let storage = server.storage_mut::<Shot>().unwrap();
    storage.remove(ids[1]).unwrap();
    storage.remove(ids[4]).unwrap();
    storage.emplace(Shot::moving(10.0));

    // late joiner: snapshot first, then the same diff as everyone else
    late.dispatch(&server.encode_snapshot());
    let diff = server.encode_tick();
    early.dispatch(&diff);
    late.dispatch(&diff);

    let expect: Vec<f32> = server
        .storage::<Shot>()
        .unwrap()
        .iter()
        .map(|(_, shot)| shot.velocity[0])
        .collect();
    for peer in [&early, &late] {
        let mut got: Vec<f32> = peer
            .storage::<Shot>()
            .unwrap()
            .iter()
            .map(|(_, shot)| shot.velocity[0])
            .collect();
        got.sort_by(f32::total_cmp);
        let mut want = expect.clone();
        want.sort_by(f32::total_cmp);
        assert_eq!(got, want);
    }
}
