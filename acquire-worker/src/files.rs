//! Destination-file preparation.
//!
//! Methods download into the first owner's destination; before an item is
//! settled the worker harmonises every owner's destination with what is
//! actually on disk: fan the master file out through hard links (symlink
//! on cross-device failure), or clean up partial writes when nothing
//! arrived. Ownership changes only happen when running as root, matching
//! how the sandboxed production setup behaves.

use acquire_common::config::Configuration;
use acquire_common::report::ReportSink;
use nix::unistd::{Gid, Uid, User, chown};
use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::Path;

use crate::item::OwnerArena;
use crate::queue::QueueItem;

const ROOT_GROUP: Gid = Gid::from_raw(0);

/// Whether `path` names an existing regular file.
pub fn real_file_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn remove_file(caller: &str, path: &Path, report: &mut ReportSink) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => report.errno(&format!("{caller}: unlink {}", path.display()), &err),
    }
}

fn change_owner_and_permission(
    caller: &str,
    path: &Path,
    user: Option<Uid>,
    mode: u32,
    report: &mut ReportSink,
) {
    if Uid::effective().is_root() {
        if let Some(uid) = user {
            if let Err(err) = chown(path, Some(uid), Some(ROOT_GROUP)) {
                report.errno(&format!("{caller}: chown {}", path.display()), &err.into());
            }
        }
    }
    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        report.errno(&format!("{caller}: chmod {}", path.display()), &err);
    }
}

/// Harmonise every owner's destination with the fetched master file.
pub fn prepare_files(
    caller: &str,
    item: &QueueItem,
    arena: &OwnerArena,
    report: &mut ReportSink,
) {
    let Some(&first) = item.owners.first() else {
        return;
    };
    let master = arena[first].dest_file.clone();

    let dev_null = Path::new("/dev/null");

    if real_file_exists(&master) {
        change_owner_and_permission(caller, &master, Some(Uid::from_raw(0)), 0o644, report);
        for &id in &item.owners {
            let dest = &arena[id].dest_file;
            if *dest == master || *dest == dev_null || master == dev_null {
                continue;
            }
            remove_file(caller, dest, report);
            if fs::hard_link(&master, dest).is_err() {
                // Destinations may live on another filesystem; a symlink
                // is the poor man's replacement there.
                if symlink(&master, dest).is_err() {
                    report.error(format!(
                        "Can't create (sym)link of file {} to {}",
                        master.display(),
                        dest.display()
                    ));
                }
            }
        }
    } else {
        for &id in &item.owners {
            let dest = &arena[id].dest_file;
            if *dest == dev_null {
                continue;
            }
            remove_file(caller, dest, report);
        }
    }
}

/// Hand an existing destination to the sandboxed method: readable and
/// writable by the sandbox user, nobody else.
pub fn sandbox_permissions(path: &Path, config: &Configuration, report: &mut ReportSink) {
    if !real_file_exists(path) {
        return;
    }
    let sandbox_uid = config
        .find("APT::Sandbox::User")
        .filter(|u| !u.is_empty())
        .and_then(|name| User::from_name(name).ok().flatten())
        .map(|u| u.uid);
    change_owner_and_permission("Item::QueueURI", path, sandbox_uid, 0o600, report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemDesc, Owner};
    use acquire_common::hashes::HashList;
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    fn owner_with_dest(dir: &Path, name: &str, uri: &str) -> Owner {
        Owner::new(
            ItemDesc::new(uri, format!("site {name}"), name),
            dir.join(name),
            HashList::new(),
            3,
        )
    }

    #[test]
    fn fan_out_links_secondary_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = OwnerArena::new();
        let a = arena.add(owner_with_dest(dir.path(), "a.deb", "http://m/x"));
        let b = arena.add(owner_with_dest(dir.path(), "b.deb", "http://m/x"));

        fs::write(dir.path().join("a.deb"), b"payload").unwrap();
        fs::write(dir.path().join("b.deb"), b"stale partial").unwrap();

        let mut item = QueueItem::new("http://m/x", "site x");
        item.owners = vec![a, b];
        let mut report = ReportSink::new();
        prepare_files("test", &item, &arena, &mut report);
        assert!(!report.has_errors());

        let master = fs::metadata(dir.path().join("a.deb")).unwrap();
        let linked = fs::metadata(dir.path().join("b.deb")).unwrap();
        assert_eq!(master.permissions().mode() & 0o7777, 0o644);
        // Same inode: a hard link, with the same payload.
        assert_eq!(master.ino(), linked.ino());
        assert_eq!(fs::read(dir.path().join("b.deb")).unwrap(), b"payload");
    }

    #[test]
    fn missing_master_cleans_up_partials() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = OwnerArena::new();
        let a = arena.add(owner_with_dest(dir.path(), "a.deb", "http://m/x"));
        let b = arena.add(owner_with_dest(dir.path(), "b.deb", "http://m/x"));
        fs::write(dir.path().join("b.deb"), b"partial").unwrap();

        let mut item = QueueItem::new("http://m/x", "site x");
        item.owners = vec![a, b];
        let mut report = ReportSink::new();
        prepare_files("test", &item, &arena, &mut report);

        assert!(!dir.path().join("a.deb").exists());
        assert!(!dir.path().join("b.deb").exists());
        assert!(!report.has_errors());
    }

    #[test]
    fn sandbox_permissions_tighten_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.deb");
        fs::write(&path, b"resume me").unwrap();

        let config = Configuration::new();
        let mut report = ReportSink::new();
        sandbox_permissions(&path, &config, &mut report);

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
        assert!(!report.has_errors());
    }

    #[test]
    fn dev_null_destinations_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = OwnerArena::new();
        let a = arena.add(owner_with_dest(dir.path(), "a.deb", "http://m/x"));
        let null = arena.add(Owner::new(
            ItemDesc::new("http://m/x", "site x", "x"),
            "/dev/null".into(),
            HashList::new(),
            3,
        ));
        fs::write(dir.path().join("a.deb"), b"payload").unwrap();

        let mut item = QueueItem::new("http://m/x", "site x");
        item.owners = vec![a, null];
        let mut report = ReportSink::new();
        prepare_files("test", &item, &arena, &mut report);

        // No link attempt at /dev/null, no errors recorded.
        assert!(!report.has_errors());
        assert!(fs::symlink_metadata("/dev/null").unwrap().file_type().is_char_device());
    }
}
