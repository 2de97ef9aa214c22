//! End-to-end scenarios against an in-memory image, one per concrete
//! scenario enumerated for the file system core plus its round-trip and
//! idempotence properties.

use tagfs_core::device::MemBlockDevice;
use tagfs_core::file::{OpenFlags, Process};
use tagfs_core::{Error, FileSystem, ops, tags};
use tagfs_types::T_DIR;

fn new_fs() -> FileSystem<MemBlockDevice> {
    FileSystem::format(MemBlockDevice::new(512), 512, 64).unwrap()
}

#[test]
fn hello_world_round_trip() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    let fd = ops::open(&fs, &mut proc, b"/a", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    let n = proc.ofile(fd).unwrap().write(b"hello").unwrap();
    assert_eq!(n, 5);
    proc.unset_ofile(fd);

    let fd = ops::open(&fs, &mut proc, b"/a", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 5];
    let n = proc.ofile(fd).unwrap().read(&mut buf).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn mkdir_create_unlink_unlink() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    ops::create(&fs, proc.cwd(), b"/d", T_DIR, 0, 0).unwrap();
    ops::open(&fs, &mut proc, b"/d/f", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();

    ops::unlink(&fs, proc.cwd(), b"/d/f").unwrap();
    ops::unlink(&fs, proc.cwd(), b"/d").unwrap();

    assert_eq!(fs.resolve(b"/d", proc.cwd()).unwrap_err(), Error::NotFound);
}

#[test]
fn unlink_non_empty_directory_fails_and_leaves_namespace_unchanged() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    ops::create(&fs, proc.cwd(), b"/d", T_DIR, 0, 0).unwrap();
    ops::open(&fs, &mut proc, b"/d/f", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();

    assert_eq!(
        ops::unlink(&fs, proc.cwd(), b"/d").unwrap_err(),
        Error::DirectoryNotEmpty
    );

    // both names still resolve.
    fs.resolve(b"/d", proc.cwd()).unwrap();
    fs.resolve(b"/d/f", proc.cwd()).unwrap();
}

#[test]
fn link_shares_inode_and_unlink_reclaims_it() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    let fd = ops::open(&fs, &mut proc, b"/a", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    proc.ofile(fd).unwrap().write(b"hello").unwrap();
    proc.unset_ofile(fd);

    ops::link(&fs, proc.cwd(), b"/a", b"/b").unwrap();

    let a = fs.resolve(b"/a", proc.cwd()).unwrap();
    let b = fs.resolve(b"/b", proc.cwd()).unwrap();
    assert_eq!(a.lock().stat().ino, b.lock().stat().ino);
    drop((a, b));

    ops::unlink(&fs, proc.cwd(), b"/a").unwrap();

    let fd = ops::open(&fs, &mut proc, b"/b", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 5];
    let n = proc.ofile(fd).unwrap().read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    proc.unset_ofile(fd);

    ops::unlink(&fs, proc.cwd(), b"/b").unwrap();
    assert_eq!(fs.resolve(b"/b", proc.cwd()).unwrap_err(), Error::NotFound);
}

#[test]
fn tag_overwrite_survives_reopen() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    let fd = ops::open(&fs, &mut proc, b"/x", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
    tags::tag_file(&fs, &proc, fd, b"lang", b"English").unwrap();
    tags::tag_file(&fs, &proc, fd, b"lang", b"Java").unwrap();
    proc.unset_ofile(fd);

    let fd = ops::open(&fs, &mut proc, b"/x", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 10];
    let n = tags::get_file_tag(&fs, &proc, fd, b"lang", &mut buf).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf[..n], b"Java");
}

#[test]
fn overlong_key_and_write_only_descriptor_are_rejected() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    let fd = ops::open(&fs, &mut proc, b"/y", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();

    assert_eq!(
        tags::tag_file(&fs, &proc, fd, b"toolongkey", b"v"),
        Err(Error::TagKeyOutOfBounds)
    );

    tags::tag_file(&fs, &proc, fd, b"k", b"v").unwrap();
    assert_eq!(
        tags::get_file_tag(&fs, &proc, fd, b"k", &mut [0u8; 4]),
        Err(Error::PermissionDenied)
    );
}

#[test]
fn create_with_create_flag_is_idempotent() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    let fd1 = ops::open(&fs, &mut proc, b"/a", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    let ino1 = proc.ofile(fd1).unwrap().inode().lock().stat().ino;

    let fd2 = ops::open(&fs, &mut proc, b"/a", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    let ino2 = proc.ofile(fd2).unwrap().inode().lock().stat().ino;

    assert_eq!(ino1, ino2);
}

#[test]
fn write_extends_size_strictly_monotonically() {
    let fs = new_fs();
    let mut proc = Process::new(fs.root_ino());

    let fd = ops::open(&fs, &mut proc, b"/a", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
    let file = proc.ofile(fd).unwrap();
    file.write(b"12345").unwrap();
    let size_after_first = file.inode().lock().stat().size;
    file.write(b"67").unwrap();
    let size_after_second = file.inode().lock().stat().size;

    assert_eq!(size_after_first, 5);
    assert_eq!(size_after_second, 7);
}
