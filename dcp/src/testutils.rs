use anyhow::Context;

pub fn setup_test_dir() -> anyhow::Result<tempfile::TempDir> {
    let tmp_dir = tempfile::tempdir()?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    // |- baz
    //    |- 3.txt
    //    |- 4.txt -> ../bar/2.txt
    let foo_path = tmp_dir.path().join("foo");
    std::fs::create_dir(&foo_path)?;
    std::fs::write(foo_path.join("0.txt"), "0")?;
    let bar_path = foo_path.join("bar");
    std::fs::create_dir(&bar_path)?;
    std::fs::write(bar_path.join("1.txt"), "1")?;
    std::fs::write(bar_path.join("2.txt"), "2")?;
    let baz_path = foo_path.join("baz");
    std::fs::create_dir(&baz_path)?;
    std::fs::write(baz_path.join("3.txt"), "3".repeat(5000))?;
    std::os::unix::fs::symlink("../bar/2.txt", baz_path.join("4.txt"))?;
    Ok(tmp_dir)
}

/// Asserts that `dst` holds the same tree as `src`: names, types, file contents and link targets.
pub fn check_dirs_identical(src: &std::path::Path, dst: &std::path::Path) -> anyhow::Result<()> {
    let mut src_names = Vec::new();
    for src_entry in std::fs::read_dir(src)? {
        let src_entry_path = src_entry?.path();
        let src_entry_name = src_entry_path
            .file_name()
            .context("entry without a name")?
            .to_owned();
        let dst_entry_path = dst.join(&src_entry_name);
        src_names.push(src_entry_name);
        let src_md = std::fs::symlink_metadata(&src_entry_path)
            .context(format!("Source file {:?} is missing!", &src_entry_path))?;
        let dst_md = std::fs::symlink_metadata(&dst_entry_path).context(format!(
            "Destination file {:?} is missing!",
            &dst_entry_path
        ))?;
        assert_eq!(src_md.file_type().is_file(), dst_md.file_type().is_file());
        assert_eq!(src_md.file_type().is_dir(), dst_md.file_type().is_dir());
        assert_eq!(
            src_md.file_type().is_symlink(),
            dst_md.file_type().is_symlink()
        );
        if src_md.file_type().is_symlink() {
            assert_eq!(
                std::fs::read_link(&src_entry_path)?,
                std::fs::read_link(&dst_entry_path)?
            );
        } else if src_md.is_file() {
            assert_eq!(
                std::fs::read(&src_entry_path)?,
                std::fs::read(&dst_entry_path)?
            );
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path)?;
        }
    }
    let dst_count = std::fs::read_dir(dst)?.count();
    assert_eq!(src_names.len(), dst_count, "{dst:?} has extra entries");
    Ok(())
}

/// Single-entry tar archive with an arbitrary (unvalidated) path.
pub fn raw_archive(path: &[u8], content: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    // written directly: `set_path` refuses `..` components
    let name = &mut header.as_old_mut().name;
    let len = path.len().min(name.len());
    name[..len].copy_from_slice(&path[..len]);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();
    let mut archive = header.as_bytes().to_vec();
    archive.extend_from_slice(content);
    archive.extend(std::iter::repeat_n(0u8, (512 - content.len() % 512) % 512));
    archive.extend_from_slice(&[0u8; 1024]);
    archive
}
