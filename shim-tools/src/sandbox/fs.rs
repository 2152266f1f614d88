//! Filesystem access.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shim_primitives::AccessMode;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::AccessResult;

/// Host open flag bits used to classify numeric flags.
#[allow(missing_docs)]
pub mod bits {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 0o1;
    pub const O_RDWR: u32 = 0o2;
    pub const O_ACCMODE: u32 = 0o3;

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    mod platform {
        pub const O_APPEND: u32 = 0x0008;
        pub const O_CREAT: u32 = 0x0200;
        pub const O_TRUNC: u32 = 0x0400;
        pub const O_EXCL: u32 = 0x0800;
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
    mod platform {
        pub const O_CREAT: u32 = 0o100;
        pub const O_EXCL: u32 = 0o200;
        pub const O_TRUNC: u32 = 0o1000;
        pub const O_APPEND: u32 = 0o2000;
    }

    pub use platform::*;

    /// Bits that make an open a write.
    pub const WRITE_MASK: u32 = O_WRONLY | O_RDWR | O_APPEND | O_CREAT | O_TRUNC;
}

/// Flags passed to [`FileAccessor::open`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OpenFlags {
    /// No flags: open for reading.
    #[default]
    Default,
    /// Symbolic mode such as `"r"`, `"w+"`, or `"ax"`.
    Symbolic(String),
    /// Numeric host flags.
    Bits(u32),
}

impl OpenFlags {
    /// Direction of the access these flags request.
    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        match self {
            Self::Default => AccessMode::Read,
            Self::Symbolic(mode) => AccessMode::from_symbolic(mode),
            Self::Bits(flags) if flags & bits::WRITE_MASK != 0 => AccessMode::Write,
            Self::Bits(_) => AccessMode::Read,
        }
    }

    /// Translates the flags into tokio open options.
    #[must_use]
    pub fn to_open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Default => {
                options.read(true);
            }
            Self::Symbolic(mode) => {
                let update = mode.contains('+');
                let exclusive = mode.contains('x');
                match mode.chars().next() {
                    Some('w') => {
                        options.write(true).read(update).truncate(true);
                        create(&mut options, exclusive);
                    }
                    Some('a') => {
                        options.append(true).read(update);
                        create(&mut options, exclusive);
                    }
                    _ => {
                        options.read(true).write(update);
                    }
                }
            }
            Self::Bits(flags) => {
                match flags & bits::O_ACCMODE {
                    bits::O_WRONLY => options.write(true),
                    bits::O_RDWR => options.read(true).write(true),
                    _ => options.read(true),
                };
                if flags & bits::O_APPEND != 0 {
                    options.append(true);
                }
                if flags & bits::O_TRUNC != 0 {
                    options.truncate(true);
                }
                if flags & bits::O_CREAT != 0 {
                    create(&mut options, flags & bits::O_EXCL != 0);
                }
            }
        }
        options
    }
}

fn create(options: &mut OpenOptions, exclusive: bool) {
    if exclusive {
        options.create_new(true);
    } else {
        options.create(true);
    }
}

/// Filesystem operations available to tool code.
///
/// Read operations: `read`, `read_to_string`, `read_dir`, `read_link`,
/// `metadata`, `symlink_metadata`, `exists`, `canonicalize`, `open_read`.
/// Write operations: `write`, `append`, `create_dir`, `create_dir_all`,
/// `remove_dir`, `remove_dir_all`, `remove_file`, `rename`, `copy`,
/// `open_write`. [`FileAccessor::open`] classifies by its flags.
#[allow(missing_docs)]
#[async_trait]
pub trait FileAccessor: Send + Sync {
    async fn read(&self, path: &Path) -> AccessResult<Vec<u8>>;
    async fn read_to_string(&self, path: &Path) -> AccessResult<String>;
    async fn read_dir(&self, path: &Path) -> AccessResult<Vec<PathBuf>>;
    async fn read_link(&self, path: &Path) -> AccessResult<PathBuf>;
    async fn metadata(&self, path: &Path) -> AccessResult<Metadata>;
    async fn symlink_metadata(&self, path: &Path) -> AccessResult<Metadata>;
    async fn exists(&self, path: &Path) -> AccessResult<bool>;
    async fn canonicalize(&self, path: &Path) -> AccessResult<PathBuf>;
    async fn open_read(&self, path: &Path) -> AccessResult<File>;

    async fn write(&self, path: &Path, contents: &[u8]) -> AccessResult<()>;
    async fn append(&self, path: &Path, contents: &[u8]) -> AccessResult<()>;
    async fn create_dir(&self, path: &Path) -> AccessResult<()>;
    async fn create_dir_all(&self, path: &Path) -> AccessResult<()>;
    async fn remove_dir(&self, path: &Path) -> AccessResult<()>;
    async fn remove_dir_all(&self, path: &Path) -> AccessResult<()>;
    async fn remove_file(&self, path: &Path) -> AccessResult<()>;
    /// Guarded on the source path.
    async fn rename(&self, from: &Path, to: &Path) -> AccessResult<()>;
    /// Guarded on the source path.
    async fn copy(&self, from: &Path, to: &Path) -> AccessResult<u64>;
    async fn open_write(&self, path: &Path) -> AccessResult<File>;

    async fn open(&self, path: &Path, flags: &OpenFlags) -> AccessResult<File>;
}

/// Unguarded filesystem backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

#[async_trait]
impl FileAccessor for NativeFs {
    async fn read(&self, path: &Path) -> AccessResult<Vec<u8>> {
        Ok(fs::read(path).await?)
    }

    async fn read_to_string(&self, path: &Path) -> AccessResult<String> {
        Ok(fs::read_to_string(path).await?)
    }

    async fn read_dir(&self, path: &Path) -> AccessResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    async fn read_link(&self, path: &Path) -> AccessResult<PathBuf> {
        Ok(fs::read_link(path).await?)
    }

    async fn metadata(&self, path: &Path) -> AccessResult<Metadata> {
        Ok(fs::metadata(path).await?)
    }

    async fn symlink_metadata(&self, path: &Path) -> AccessResult<Metadata> {
        Ok(fs::symlink_metadata(path).await?)
    }

    async fn exists(&self, path: &Path) -> AccessResult<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn canonicalize(&self, path: &Path) -> AccessResult<PathBuf> {
        Ok(fs::canonicalize(path).await?)
    }

    async fn open_read(&self, path: &Path) -> AccessResult<File> {
        Ok(File::open(path).await?)
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> AccessResult<()> {
        Ok(fs::write(path, contents).await?)
    }

    async fn append(&self, path: &Path, contents: &[u8]) -> AccessResult<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await?;
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> AccessResult<()> {
        Ok(fs::create_dir(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> AccessResult<()> {
        Ok(fs::create_dir_all(path).await?)
    }

    async fn remove_dir(&self, path: &Path) -> AccessResult<()> {
        Ok(fs::remove_dir(path).await?)
    }

    async fn remove_dir_all(&self, path: &Path) -> AccessResult<()> {
        Ok(fs::remove_dir_all(path).await?)
    }

    async fn remove_file(&self, path: &Path) -> AccessResult<()> {
        Ok(fs::remove_file(path).await?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> AccessResult<()> {
        Ok(fs::rename(from, to).await?)
    }

    async fn copy(&self, from: &Path, to: &Path) -> AccessResult<u64> {
        Ok(fs::copy(from, to).await?)
    }

    async fn open_write(&self, path: &Path) -> AccessResult<File> {
        Ok(File::create(path).await?)
    }

    async fn open(&self, path: &Path, flags: &OpenFlags) -> AccessResult<File> {
        Ok(flags.to_open_options().open(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn numeric_flags_classify_by_write_bits() {
        assert_eq!(OpenFlags::Bits(bits::O_RDONLY).access_mode(), AccessMode::Read);
        assert_eq!(OpenFlags::Bits(bits::O_WRONLY).access_mode(), AccessMode::Write);
        assert_eq!(OpenFlags::Bits(bits::O_RDWR).access_mode(), AccessMode::Write);
        assert_eq!(OpenFlags::Bits(bits::O_APPEND).access_mode(), AccessMode::Write);
        assert_eq!(OpenFlags::Bits(bits::O_CREAT).access_mode(), AccessMode::Write);
        assert_eq!(OpenFlags::Bits(bits::O_TRUNC).access_mode(), AccessMode::Write);
    }

    #[test]
    fn symbolic_and_absent_flags() {
        assert_eq!(OpenFlags::Default.access_mode(), AccessMode::Read);
        assert_eq!(OpenFlags::Symbolic("r".into()).access_mode(), AccessMode::Read);
        assert_eq!(OpenFlags::Symbolic("r+".into()).access_mode(), AccessMode::Write);
        assert_eq!(OpenFlags::Symbolic("ax".into()).access_mode(), AccessMode::Write);
    }

    #[tokio::test]
    async fn native_fs_writes_appends_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");

        NativeFs.write(&file, b"one").await.unwrap();
        NativeFs.append(&file, b" two").await.unwrap();
        assert_eq!(NativeFs.read_to_string(&file).await.unwrap(), "one two");
        assert!(NativeFs.exists(&file).await.unwrap());
        assert_eq!(NativeFs.read_dir(dir.path()).await.unwrap(), [file.clone()]);

        let mut opened = NativeFs
            .open(&file, &OpenFlags::Symbolic("r".into()))
            .await
            .unwrap();
        let mut contents = String::new();
        opened.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "one two");
    }

    #[tokio::test]
    async fn symbolic_write_flags_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        NativeFs.write(&file, b"stale contents").await.unwrap();

        let mut handle = NativeFs
            .open(&file, &OpenFlags::Symbolic("w".into()))
            .await
            .unwrap();
        handle.write_all(b"new").await.unwrap();
        handle.flush().await.unwrap();
        drop(handle);

        assert_eq!(NativeFs.read(&file).await.unwrap(), b"new");
    }
}
