use chrono::{NaiveDate, NaiveTime};
use std::fs;
use std::sync::Arc;

use uhf_engine::models::{lock_schedule, Category, ListProgram, ListSchedule, Resource};
use uhf_engine::{Channel, ChannelError, FsStorage, MemoryStorage};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
}

#[test]
fn test_round_trip_through_the_file_system() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FsStorage::new(dir.path()));

    let mut channel = Channel::create(storage.clone(), 2, start()).unwrap();
    channel.set_channel_title(Some("Channel 38".to_string()));
    channel.add_series("news", "Evening News").unwrap();
    channel
        .add_category(Category {
            id: "kids".to_string(),
            title: "Kids".to_string(),
            chyron_path: Some("chyrons/kids.png".to_string()),
        })
        .unwrap();
    channel.set_beginning_of_broadcast_day("05:30").unwrap();
    channel.create_list("bumpers", Some("Bumpers".to_string()), "lists/bumpers.json").unwrap();
    channel
        .add_resource_to_list("bumpers", Resource::new("bumpers/station-id.mp4", 15))
        .unwrap();
    channel
        .set_dotw_list_schedule(
            0,
            ListSchedule {
                schedule: vec![ListProgram {
                    start_time: t(0, 0),
                    list_ids: vec!["bumpers".to_string()],
                    end_time: Some(t(5, 30)),
                }],
            },
        )
        .unwrap();

    let news = Resource {
        series_id: Some("news".to_string()),
        year: Some(1987),
        ..Resource::new("news/1987-09-01.mp4", 1800)
    };
    channel.insert_program(0, t(18, 0), news, Some("kids".to_string())).unwrap();
    channel
        .insert_program(8, t(20, 0), Resource::new("movies/Alien.mkv", 7020), None)
        .unwrap();

    let report = channel.save().unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert!(dir.path().join("manifest.json").exists());
    assert!(dir.path().join("lists/bumpers.json").exists());

    let reopened = Channel::open(storage).unwrap();
    assert!(!reopened.is_dirty());
    assert_eq!(reopened.manifest(), channel.manifest());
    assert_eq!(reopened.lists(), channel.lists());
    for index in 0..channel.schedule_count() {
        let before = channel.schedule(index).unwrap();
        let after = reopened.schedule(index).unwrap();
        assert_eq!(*lock_schedule(&before), *lock_schedule(&after));
    }
    assert_eq!(reopened.programs_for(8)[0].start_time, t(20, 0));
}

#[test]
fn test_deleted_program_resource_is_pruned_on_save() {
    let storage = Arc::new(MemoryStorage::new());
    let mut channel = Channel::create(storage.clone(), 1, start()).unwrap();
    channel
        .insert_program(0, t(9, 0), Resource::new("shows/a.mp4", 60), None)
        .unwrap();
    channel.rekey_resource(0, t(9, 0), "r1").unwrap();
    channel.save().unwrap();

    let shared = channel.schedule(0).unwrap();
    assert!(lock_schedule(&shared).resources.contains_key("r1"));

    channel.delete_program(0, t(9, 0)).unwrap();
    let report = channel.save().unwrap();
    assert_eq!(report.orphans_removed, 1);

    let reopened = Channel::open(storage).unwrap();
    let shared = reopened.schedule(0).unwrap();
    assert!(lock_schedule(&shared).resources.is_empty());
}

#[test]
fn test_hand_edited_files_open() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("manifest.json"),
        r#"{
            // written by hand
            "version": "UHF channel - v1",
            "schedules": [
                { "start_date": "2024-09-01", "schedule_path": "week1.json" }
            ],
            "beginning_of_broadcast_day": "06:00:00"
        }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("week1.json"),
        r#"{
            "version": "UHF Schedule - v1",
            "resources": {
                "abc": { "path": "a.mp4", "duration": 30 }
            },
            "days": [
                [ { "start_time": "07:15:00", "resource_id": "abc" },
                  { "start_time": "08:00", "resource_id": "missing" } ],
                [], [], [], [], [], []
            ]
        }"#,
    )
    .unwrap();

    let channel = Channel::open(Arc::new(FsStorage::new(dir.path()))).unwrap();
    assert_eq!(channel.total_days(), 7);
    assert_eq!(channel.manifest().beginning_of_broadcast_day, Some(t(6, 0)));
    assert_eq!(channel.programs_for(0)[0].start_time, t(7, 15));

    let rows = channel.day_schedule(0);
    assert!(rows[0].error, "a.mp4 does not exist on disk");
    assert!(rows[1].error);
    assert_eq!(channel.validate().issues.len(), 2);
}

#[test]
fn test_unsorted_day_is_sorted_on_open() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert(
        "manifest.json",
        r#"{"version": "UHF Channel - v1",
            "schedules": [{"start_date": "2024-09-01", "schedule_path": "s.json"}]}"#,
    );
    storage.insert(
        "s.json",
        r#"{"version": "UHF Schedule - v1",
            "resources": {
                "a": { "path": "a.mp4", "duration": 60 },
                "b": { "path": "b.mp4", "duration": 60 }
            },
            "days": [
                [ { "start_time": "10:00", "resource_id": "a" },
                  { "start_time": "09:00", "resource_id": "b" } ],
                [], [], [], [], [], []
            ]}"#,
    );

    let mut channel = Channel::open(storage).unwrap();
    assert!(!channel.is_dirty());
    let times: Vec<NaiveTime> = channel.programs_for(0).iter().map(|p| p.start_time).collect();
    assert_eq!(times, vec![t(9, 0), t(10, 0)]);

    channel
        .insert_program(0, t(9, 30), Resource::new("c.mp4", 60), None)
        .unwrap();
    let times: Vec<NaiveTime> = channel.programs_for(0).iter().map(|p| p.start_time).collect();
    assert_eq!(times, vec![t(9, 0), t(9, 30), t(10, 0)]);
}

#[test]
fn test_start_times_with_seconds_survive_save() {
    let storage = Arc::new(MemoryStorage::new());
    let mut channel = Channel::create(storage.clone(), 1, start()).unwrap();
    let with_seconds = NaiveTime::from_hms_opt(20, 30, 15).unwrap();
    channel
        .insert_program(0, with_seconds, Resource::new("a.mp4", 60), None)
        .unwrap();
    let stored = channel.programs_for(0)[0].start_time;
    assert_eq!(stored, t(20, 30));
    assert!(channel.program_at(0, with_seconds).is_some());

    channel
        .insert_program(0, NaiveTime::from_hms_opt(21, 0, 59).unwrap(), Resource::new("b.mp4", 60), None)
        .unwrap();
    channel
        .set_program_start_time(0, t(21, 0), NaiveTime::from_hms_opt(22, 15, 30).unwrap())
        .unwrap();
    channel.save().unwrap();

    let reopened = Channel::open(storage).unwrap();
    let times: Vec<NaiveTime> = reopened.programs_for(0).iter().map(|p| p.start_time).collect();
    assert_eq!(times, vec![stored, t(22, 15)]);
    let before = channel.schedule(0).unwrap();
    let after = reopened.schedule(0).unwrap();
    assert_eq!(*lock_schedule(&before), *lock_schedule(&after));
}

#[test]
fn test_unsupported_schedule_version_fails_open() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert(
        "manifest.json",
        r#"{"version": "UHF Channel - v1",
            "schedules": [{"start_date": "2024-09-01", "schedule_path": "s.json"}]}"#,
    );
    storage.insert(
        "s.json",
        r#"{"version": "UHF Schedule - v2", "resources": {}, "days": []}"#,
    );
    match Channel::open(storage) {
        Err(ChannelError::UnsupportedVersion { path, .. }) => {
            assert_eq!(path.to_string_lossy(), "s.json")
        }
        other => panic!("expected a version error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_partial_failure_keeps_only_failed_entities_dirty() {
    let storage = Arc::new(MemoryStorage::new());
    let mut channel = Channel::create(storage.clone(), 3, start()).unwrap();
    channel.create_list("fill", None, "fill.json").unwrap();
    storage.fail_writes_to("schedule1.json");
    storage.fail_writes_to("fill.json");

    let report = channel.save().unwrap();
    assert!(report.manifest_written);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(channel.dirty().dirty_schedules(), vec![1]);
    assert_eq!(channel.dirty().dirty_lists(), vec!["fill".to_string()]);
    assert!(channel.is_dirty());
}

#[test]
fn test_export_resource_database() {
    let storage = Arc::new(MemoryStorage::new());
    let mut channel = Channel::create(storage.clone(), 2, start()).unwrap();
    channel
        .insert_program(0, t(9, 0), Resource::new("b.mp4", 60), None)
        .unwrap();
    channel
        .insert_program(7, t(9, 0), Resource::new("a.mp4", 60), None)
        .unwrap();
    channel
        .insert_program(8, t(9, 0), Resource::new("b.mp4", 0), None)
        .unwrap();

    let written = channel
        .export_resource_database(std::path::Path::new("resources.json"))
        .unwrap();
    assert_eq!(written, 2);

    let bytes = storage.get("resources.json").unwrap();
    let exported: Vec<Resource> = serde_json::from_slice(&bytes).unwrap();
    let paths: Vec<&str> = exported.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a.mp4", "b.mp4"]);
}
