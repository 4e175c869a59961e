//! Permission-system integration tests: owner/group/other triads, denial
//! across users, and the uid-0 override.

use groupfs::{BlockDevice, FileSystem, FsError};

fn memory_fs() -> FileSystem {
    let device = BlockDevice::in_memory(16 * 1024 * 1024).unwrap();
    FileSystem::format(device).unwrap()
}

#[test]
fn owner_keeps_full_access() {
    let mut fs = memory_fs();

    fs.login(100, 100);
    fs.create_file("/u100_file.txt").unwrap();
    fs.write_file("/u100_file.txt", b"User 100 content").unwrap();

    assert_eq!(fs.read_file("/u100_file.txt").unwrap(), b"User 100 content");
    fs.write_file("/u100_file.txt", b"Modified by owner").unwrap();
    assert_eq!(fs.read_file("/u100_file.txt").unwrap(), b"Modified by owner");
}

#[test]
fn cross_user_denials() {
    let mut fs = memory_fs();

    // Root creates a shared directory.
    fs.create_dir("/shared").unwrap();

    fs.login(100, 100);
    fs.create_file("/shared/u.txt").unwrap();
    fs.write_file("/shared/u.txt", b"s").unwrap();

    fs.login(200, 200);
    // Default 0o644 lets others read.
    assert_eq!(fs.read_file("/shared/u.txt").unwrap(), b"s");
    // ...but never write.
    assert!(matches!(
        fs.write_file("/shared/u.txt", b"h"),
        Err(FsError::PermissionDenied(_))
    ));
    // Deleting needs write access on the parent, which /shared (root,
    // 0o755) does not grant to others.
    assert!(matches!(
        fs.delete_file("/shared/u.txt"),
        Err(FsError::PermissionDenied(_))
    ));

    // The denied operations changed nothing.
    assert_eq!(fs.read_file("/shared/u.txt").unwrap(), b"s");
}

#[test]
fn root_override() {
    let mut fs = memory_fs();
    fs.create_dir("/shared").unwrap();

    fs.login(100, 100);
    fs.create_file("/shared/u.txt").unwrap();
    fs.write_file("/shared/u.txt", b"s").unwrap();

    // Back to uid 0: ownership no longer matters.
    fs.logout();
    fs.delete_file("/shared/u.txt").unwrap();
    assert!(fs.list_dir("/shared").unwrap().is_empty());
}

#[test]
fn group_triad_applies_before_other() {
    let mut fs = memory_fs();

    fs.login(100, 50);
    fs.create_file("/team.txt").unwrap();
    fs.write_file("/team.txt", b"notes").unwrap();

    // Same group: 0o644's group triad is read-only.
    fs.login(777, 50);
    assert_eq!(fs.read_file("/team.txt").unwrap(), b"notes");
    assert!(matches!(
        fs.write_file("/team.txt", b"edit"),
        Err(FsError::PermissionDenied(_))
    ));
}

#[test]
fn listing_respects_read_permission() {
    let mut fs = memory_fs();

    fs.login(100, 100);
    fs.create_dir("/private").unwrap();
    fs.create_file("/private/secret").unwrap();

    // The directory is 0o755: others may still list it.
    fs.login(200, 200);
    assert_eq!(fs.list_dir("/private").unwrap().len(), 1);

    // Entries report the creator's ownership.
    let entries = fs.list_dir("/private").unwrap();
    assert_eq!((entries[0].uid, entries[0].gid), (100, 100));
}

#[test]
fn uid_zero_is_never_denied() {
    let mut fs = memory_fs();

    fs.login(100, 100);
    fs.create_dir("/theirs").unwrap();
    fs.create_file("/theirs/data").unwrap();
    fs.write_file("/theirs/data", b"x").unwrap();

    fs.logout();
    assert_eq!(fs.current_user(), 0);

    // Every operation passes for root, regardless of ownership.
    fs.read_file("/theirs/data").unwrap();
    fs.write_file("/theirs/data", b"y").unwrap();
    fs.list_dir("/theirs").unwrap();
    fs.create_file("/theirs/more").unwrap();
    fs.delete_file("/theirs/more").unwrap();
    fs.delete_dir("/theirs").unwrap();
}
