use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use tar::{Archive, Entry};

use crate::constants::{COPY_BUFFER_SIZE, MAX_SYMLINK_DEPTH};
use crate::error::SeekerError;
use crate::search::pattern::{normalize_member_name, Pattern};
use crate::search::{scratch_destination, EvidenceSource, SourceKind};

/// Where a member's bytes live in the (uncompressed) archive stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemberData {
    offset: u64,
    size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemberKind {
    /// Regular file, or a link resolved to the member holding the bytes
    File(MemberData),
    Directory,
    /// Symbolic link, resolved once the whole archive is indexed
    Symlink(String),
    /// Nothing to extract; the reason is logged when a pattern matches it
    Other(String),
}

#[derive(Debug, Clone)]
struct TarMember {
    name: String,
    kind: MemberKind,
    mtime: u64,
}

impl TarMember {
    fn data(&self) -> Option<MemberData> {
        match self.kind {
            MemberKind::File(data) => Some(data),
            _ => None,
        }
    }
}

/// Evidence source over a tar or tar.gz archive.
///
/// The member list is read once on open. A name stored more than once keeps
/// its first position and its last content. Hard links and symbolic links
/// are extracted as copies of the member they point at.
///
/// Matching members are extracted into the scratch folder with their
/// original modification time; each member is extracted at most once per
/// run, later patterns reuse the extracted copy.
pub struct TarSource {
    path: PathBuf,
    scratch: PathBuf,
    gzip: bool,
    file: Option<File>,
    members: Vec<TarMember>,
    extracted: HashMap<String, PathBuf>,
    failed: HashSet<String>,
}

impl TarSource {
    /// Open an archive and read its member list.
    ///
    /// A `gz` / `tgz` suffix selects transparent gzip decompression.
    pub fn open(path: &Path, scratch: &Path) -> Result<Self, SeekerError> {
        let file = File::open(path).map_err(|e| SeekerError::container(path, e))?;
        let gzip = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase().ends_with("gz"))
            .unwrap_or(false);

        let members = read_members(&file, gzip).map_err(|e| SeekerError::container(path, e))?;
        info!(
            "Indexed {} members in {}{}",
            members.len(),
            path.display(),
            if gzip { " (gzip)" } else { "" }
        );

        Ok(TarSource {
            path: path.to_path_buf(),
            scratch: scratch.to_path_buf(),
            gzip,
            file: Some(file),
            members,
            extracted: HashMap::new(),
            failed: HashSet::new(),
        })
    }

    /// Whether the archive is gzip compressed
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    fn archive_file(&self) -> Result<&File, SeekerError> {
        self.file
            .as_ref()
            .ok_or_else(|| SeekerError::container(&self.path, "archive already closed"))
    }

    /// Uncompressed archives: seek straight to each member's data
    fn extract_by_offset(&mut self, pending: &[usize]) -> Result<(), SeekerError> {
        for &idx in pending {
            let member = self.members[idx].clone();
            let Some(data) = member.data() else {
                continue;
            };
            let result = match scratch_destination(&self.scratch, &member.name) {
                Some(dest) => {
                    let mut file = self.archive_file()?;
                    let copied = match file.seek(SeekFrom::Start(data.offset)) {
                        Ok(_) => write_member(&dest, &mut file.take(data.size), member.mtime),
                        Err(e) => Err(e),
                    };
                    copied.map(|_| dest)
                }
                None => Err(escapes_scratch()),
            };
            self.record(&member.name, result);
        }
        Ok(())
    }

    /// Compressed archives: stream the archive once and pick the wanted
    /// members by data offset, so duplicate names and links resolve to the
    /// same bytes as in `extract_by_offset`.
    fn extract_by_stream(&mut self, pending: &[usize]) -> Result<(), SeekerError> {
        let mut wanted: HashMap<u64, Vec<usize>> = HashMap::new();
        for &idx in pending {
            if let Some(data) = self.members[idx].data() {
                wanted.entry(data.offset).or_default().push(idx);
            }
        }

        let file = self.archive_file()?;
        let mut outcomes = Vec::new();
        let stream_result = (|| -> io::Result<()> {
            let mut archive = Archive::new(open_reader(file, true)?);
            for entry in archive.entries()? {
                if wanted.is_empty() {
                    break;
                }
                let mut entry = entry?;
                let Some(targets) = wanted.remove(&entry.raw_file_position()) else {
                    continue;
                };

                // The first target reads the entry, the others copy it
                let mut first: Option<PathBuf> = None;
                let mut consumed = false;
                for idx in targets {
                    let member = &self.members[idx];
                    let result = match scratch_destination(&self.scratch, &member.name) {
                        Some(dest) => match &first {
                            Some(source) => copy_member(source, &dest, member.mtime).map(|_| dest),
                            None if consumed => Err(io::Error::new(
                                io::ErrorKind::Other,
                                "member data already consumed by a failed extraction",
                            )),
                            None => {
                                consumed = true;
                                write_member(&dest, &mut entry, member.mtime).map(|_| dest)
                            }
                        },
                        None => Err(escapes_scratch()),
                    };
                    if first.is_none() {
                        if let Ok(dest) = &result {
                            first = Some(dest.clone());
                        }
                    }
                    outcomes.push((member.name.clone(), result));
                }
            }
            Ok(())
        })();

        if let Err(e) = stream_result {
            warn!("Archive {} could not be fully read: {}", self.path.display(), e);
        }
        for (name, result) in outcomes {
            self.record(&name, result);
        }
        // Anything still wanted was never reached in the stream
        let unreached: Vec<String> = wanted
            .into_values()
            .flatten()
            .map(|idx| self.members[idx].name.clone())
            .collect();
        for name in unreached {
            self.record(
                &name,
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "member not reached")),
            );
        }
        Ok(())
    }

    fn record(&mut self, name: &str, result: io::Result<PathBuf>) {
        match result {
            Ok(dest) => {
                debug!("Extracted {} to {}", name, dest.display());
                self.extracted.insert(name.to_string(), dest);
            }
            Err(e) => {
                warn!("Could not extract {} from {}: {}", name, self.path.display(), e);
                self.failed.insert(name.to_string());
            }
        }
    }
}

impl EvidenceSource for TarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Tar
    }

    fn search(&mut self, pattern: &Pattern) -> Result<Vec<PathBuf>, SeekerError> {
        let matched: Vec<usize> = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, member)| pattern.is_match(&member.name))
            .map(|(idx, _)| idx)
            .collect();

        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let pending: Vec<usize> = matched
            .iter()
            .copied()
            .filter(|&idx| {
                let member = &self.members[idx];
                member.data().is_some()
                    && !self.extracted.contains_key(&member.name)
                    && !self.failed.contains(&member.name)
            })
            .collect();

        if !pending.is_empty() {
            debug!("Extracting {} members for {}", pending.len(), pattern);
            if self.gzip {
                self.extract_by_stream(&pending)?;
            } else {
                self.extract_by_offset(&pending)?;
            }
        }

        let mut paths = Vec::with_capacity(matched.len());
        let mut seen = HashSet::new();
        for idx in matched {
            let member = &self.members[idx];
            let dest = match &member.kind {
                MemberKind::File(_) => self.extracted.get(&member.name).cloned(),
                MemberKind::Directory => match scratch_destination(&self.scratch, &member.name) {
                    Some(dest) => {
                        fs::create_dir_all(&dest)?;
                        Some(dest)
                    }
                    None => None,
                },
                MemberKind::Symlink(reason) | MemberKind::Other(reason) => {
                    info!("Skipping archive member {} ({})", member.name, reason);
                    None
                }
            };
            if let Some(dest) = dest {
                if seen.insert(dest.clone()) {
                    paths.push(dest);
                }
            }
        }
        Ok(paths)
    }

    fn indexed(&self) -> usize {
        self.members.len()
    }

    fn extraction_failures(&self) -> usize {
        self.failed.len()
    }

    fn cleanup(&mut self) -> Result<(), SeekerError> {
        if self.file.take().is_some() {
            debug!("Closed archive {}", self.path.display());
        }
        Ok(())
    }
}

/// Rewind the archive file and wrap it for reading
fn open_reader(file: &File, gzip: bool) -> io::Result<Box<dyn Read + '_>> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(0))?;
    let reader = BufReader::with_capacity(COPY_BUFFER_SIZE, handle);
    if gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn read_members(file: &File, gzip: bool) -> io::Result<Vec<TarMember>> {
    let mut archive = Archive::new(open_reader(file, gzip)?);
    let mut members: Vec<TarMember> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for entry in archive.entries()? {
        let entry = entry?;
        let name = normalize_member_name(&entry.path()?.to_string_lossy());
        if name.is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        let kind = if entry_type.is_dir() {
            MemberKind::Directory
        } else if entry_type.is_file() {
            MemberKind::File(MemberData {
                offset: entry.raw_file_position(),
                size: entry.size(),
            })
        } else if entry_type.is_hard_link() {
            // A hard link shares the bytes of a member stored before it
            let target = normalize_member_name(&link_target(&entry)?);
            match by_name.get(&target).map(|&idx| &members[idx].kind) {
                Some(MemberKind::File(data)) => MemberKind::File(*data),
                _ => MemberKind::Other(format!("hard link to missing member {}", target)),
            }
        } else if entry_type.is_symlink() {
            MemberKind::Symlink(link_target(&entry)?)
        } else {
            MemberKind::Other(format!("{:?} member", entry_type))
        };

        let member = TarMember {
            name: name.clone(),
            kind,
            mtime: entry.header().mtime().unwrap_or(0),
        };
        match by_name.get(&name) {
            Some(&idx) => {
                debug!("Member {} is stored more than once, keeping the last copy", name);
                members[idx] = member;
            }
            None => {
                by_name.insert(name, members.len());
                members.push(member);
            }
        }
    }

    resolve_symlinks(&mut members, &by_name);
    Ok(members)
}

fn link_target<R: Read>(entry: &Entry<'_, R>) -> io::Result<String> {
    Ok(entry
        .link_name()?
        .map(|target| target.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default())
}

/// Point symbolic links at the data of the file they end up at.
///
/// Links may name members stored after them, so this runs once the whole
/// archive is indexed.
fn resolve_symlinks(members: &mut [TarMember], by_name: &HashMap<String, usize>) {
    for idx in 0..members.len() {
        let MemberKind::Symlink(target) = &members[idx].kind else {
            continue;
        };
        let target = target.clone();

        let mut current = symlink_destination(&members[idx].name, &target);
        let mut resolved = None;
        for _ in 0..MAX_SYMLINK_DEPTH {
            let Some(name) = current.take() else {
                break;
            };
            match by_name.get(&name).map(|&i| &members[i].kind) {
                Some(MemberKind::File(data)) => {
                    resolved = Some(*data);
                    break;
                }
                Some(MemberKind::Symlink(next)) => current = symlink_destination(&name, next),
                _ => break,
            }
        }

        members[idx].kind = match resolved {
            Some(data) => MemberKind::File(data),
            None => MemberKind::Other(format!("symlink to {} has no file in the archive", target)),
        };
    }
}

/// Archive member a symbolic link at `link` pointing to `target` names
fn symlink_destination(link: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if !target.starts_with('/') {
        parts.extend(link.split('/'));
        parts.pop();
    }
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn escapes_scratch() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "member path escapes the scratch folder",
    )
}

fn write_member(dest: &Path, reader: &mut dyn Read, mtime: u64) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let result = (|| {
        let file = File::create(dest)?;
        let mut writer = BufWriter::new(file);
        io::copy(reader, &mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime))
    })();
    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

/// Copy an already extracted member to another member's destination
fn copy_member(source: &Path, dest: &Path, mtime: u64) -> io::Result<()> {
    let mut reader = File::open(source)?;
    write_member(dest, &mut reader, mtime)
}
