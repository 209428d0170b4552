use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Append-only write-ahead log of booking and catalog events.
///
/// Record layout: `[u32 LE: len][bincode: Event][u32 LE: crc32(payload)]`.
/// A torn or corrupt tail (crash mid-write) ends replay at the last good record,
/// and [`Wal::recover`] cuts the file back to that record before appending.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Bytes of the file known to hold whole, synced records.
    synced_len: u64,
    /// Bytes buffered or written since the last successful `flush_sync`.
    pending_len: u64,
    pending_appends: u64,
    /// Set while the file may end in bytes past `synced_len`.
    dirty_tail: bool,
    appends_since_compact: u64,
}

/// Returns the number of bytes written.
fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(record_len(&payload))
}

fn record_len(payload: &[u8]) -> u64 {
    payload.len() as u64 + 8
}

/// Why replay stopped before end of file.
#[derive(Debug, PartialEq, Eq)]
enum Tail {
    Truncated,
    BadChecksum,
    Undecodable,
}

/// `Ok(None)` at clean end of file, `Err(tail)` when the remaining bytes are
/// not a whole valid record. A good record comes back with its size on disk.
fn read_record(reader: &mut impl Read) -> io::Result<Result<Option<(Event, u64)>, Tail>> {
    let mut len_buf = [0u8; 4];
    match read_full(reader, &mut len_buf)? {
        0 => return Ok(Ok(None)),
        4 => {}
        _ => return Ok(Err(Tail::Truncated)),
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    let mut crc_buf = [0u8; 4];
    if read_full(reader, &mut payload)? < payload.len() || read_full(reader, &mut crc_buf)? < 4 {
        return Ok(Err(Tail::Truncated));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Err(Tail::BadChecksum));
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .map(|event| Some((event, record_len(&payload))))
        .map_err(|_| Tail::Undecodable))
}

/// Like `read_exact`, but reports how many bytes were available instead of
/// failing on a short read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Valid records plus the byte offset where the last one ends.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    loop {
        match read_record(&mut reader)? {
            Ok(Some((event, len))) => {
                events.push(event);
                valid_len += len;
            }
            Ok(None) => break,
            Err(tail) => {
                tracing::warn!(
                    "WAL {}: discarding tail after record {} at byte {valid_len} ({tail:?})",
                    path.display(),
                    events.len()
                );
                break;
            }
        }
    }
    Ok((events, valid_len))
}

impl Wal {
    /// Open for appends. The file must already end on a record boundary; use
    /// [`Wal::recover`] for a log that may carry a torn tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            pending_len: 0,
            pending_appends: 0,
            dirty_tail: false,
            appends_since_compact: 0,
        })
    }

    /// Replay the log, truncate anything after the last good record and open
    /// it for appends.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        if let Ok(meta) = fs::metadata(path) {
            if meta.len() > valid_len {
                tracing::warn!(
                    "WAL {}: truncating {} trailing bytes",
                    path.display(),
                    meta.len() - valid_len
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
        }
        Ok((Self::open(path)?, events))
    }

    /// Buffered append + fsync of one record.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one record. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.dirty_tail {
            self.rollback()?;
        }
        // The writer may spill part of a record to the file before failing.
        self.dirty_tail = true;
        let len = write_record(&mut self.writer, event)?;
        self.dirty_tail = false;
        self.pending_len += len;
        self.pending_appends += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.pending_len > 0 {
            self.dirty_tail = true;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.synced_len += self.pending_len;
        self.appends_since_compact += self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        self.dirty_tail = false;
        Ok(())
    }

    /// Drop every record appended since the last successful `flush_sync`:
    /// discard what is still buffered and cut the file back to its synced
    /// length. Until this succeeds the next append retries it.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.dirty_tail = true;
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back the buffer without writing it.
        let (_, _unwritten) = stale.into_parts();
        self.pending_len = 0;
        self.pending_appends = 0;
        let file = self.writer.get_ref();
        file.set_len(self.synced_len)?;
        file.sync_all()?;
        self.dirty_tail = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.compact")
    }

    /// Write the snapshot to a side file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            write_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the live log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.pending_len = 0;
        self.pending_appends = 0;
        self.dirty_tail = false;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every valid record in order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cowork_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn location_with_desk() -> (Location, Space) {
        let location = Location {
            id: Ulid::new(),
            name: "Navigli Hub".into(),
            city: "Milano".into(),
            address: "Ripa di Porta Ticinese 7".into(),
            services: ["wifi".to_string()].into_iter().collect(),
        };
        let space = Space {
            id: Ulid::new(),
            location_id: location.id,
            name: "Desk 4".into(),
            kind: SpaceKind::Desk,
            price_per_hour: 1_000,
            capacity: 1,
        };
        (location, space)
    }

    fn booking_on(space_id: Ulid, start: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            space_id,
            user_id: Ulid::new(),
            span: Span::new(start, start + HOUR_MS),
            payment_status: PaymentStatus::Pending,
            status: BookingStatus::Pending,
            created_at: start - HOUR_MS,
            price: Some(1_000),
            note: Some("window seat".into()),
        }
    }

    #[test]
    fn catalog_and_booking_events_replay_in_order() {
        let path = tmp_path("replay_order.wal");
        let (location, space) = location_with_desk();
        let booking = booking_on(space.id, 1_767_258_000_000);
        let events = vec![
            Event::LocationCreated {
                location,
                spaces: vec![space.clone()],
            },
            Event::BookingCreated {
                booking: booking.clone(),
            },
            Event::PaymentStatusSet {
                id: booking.id,
                space_id: space.id,
                payment_status: PaymentStatus::Paid,
            },
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn torn_record_is_dropped() {
        let path = tmp_path("torn.wal");
        let (location, _) = location_with_desk();
        let first = Event::LocationDeleted { id: location.id };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        // A second record whose length promises more bytes than were written.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&64u32.to_le_bytes()).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn recover_cuts_torn_tail_so_new_records_replay() {
        let path = tmp_path("recover_torn.wal");
        let (location, space) = location_with_desk();
        let first = Event::LocationCreated {
            location,
            spaces: vec![space.clone()],
        };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0xAB; 6]).unwrap();
        }

        let (mut wal, events) = Wal::recover(&path).unwrap();
        assert_eq!(events, vec![first.clone()]);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        let second = Event::BookingCreated {
            booking: booking_on(space.id, 1_767_258_000_000),
        };
        wal.append(&second).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![first, second]);
    }

    #[test]
    fn rollback_discards_unsynced_records() {
        let path = tmp_path("rollback.wal");
        let (_, space) = location_with_desk();
        let kept = Event::BookingCreated {
            booking: booking_on(space.id, 1_767_258_000_000),
        };
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();
        let synced = fs::metadata(&path).unwrap().len();

        // Large enough to spill past the write buffer into the file.
        let mut big = booking_on(space.id, 1_767_261_600_000);
        big.note = Some("x".repeat(64 * 1024));
        wal.append_buffered(&Event::BookingCreated { booking: big }).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > synced);

        wal.rollback().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), synced);

        let next = Event::BookingCreated {
            booking: booking_on(space.id, 1_767_265_200_000),
        };
        wal.append(&next).unwrap();
        assert_eq!(wal.appends_since_compact(), 2);
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, next]);
    }

    #[test]
    fn short_length_prefix_is_dropped() {
        let path = tmp_path("short_len.wal");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&[7, 0]).unwrap();
        }
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_empty_log() {
        let path = tmp_path("never_written.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn checksum_mismatch_stops_replay() {
        let path = tmp_path("bad_crc.wal");
        let good = Event::SpaceDeleted { id: Ulid::new() };
        let bad = Event::SpaceDeleted { id: Ulid::new() };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&bad).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&(crc32fast::hash(&payload) ^ 1).to_le_bytes()).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn compaction_replaces_churn_and_accepts_new_appends() {
        let path = tmp_path("compact.wal");
        let (location, space) = location_with_desk();
        let created = Event::LocationCreated {
            location,
            spaces: vec![space.clone()],
        };

        let mut wal = Wal::open(&path).unwrap();
        wal.append(&created).unwrap();
        for i in 0..20 {
            let booking = booking_on(space.id, 1_767_258_000_000 + i * HOUR_MS);
            let id = booking.id;
            wal.append(&Event::BookingCreated { booking }).unwrap();
            wal.append(&Event::BookingCancelled {
                id,
                space_id: space.id,
            })
            .unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 41);
        let before = fs::metadata(&path).unwrap().len();

        wal.compact(std::slice::from_ref(&created)).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "{after} should be below {before}");

        let late = Event::BookingCreated {
            booking: booking_on(space.id, 1_767_344_400_000),
        };
        wal.append(&late).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![created, late]);
        assert!(!Wal::compact_path(&path).exists());
    }

    #[test]
    fn buffered_appends_are_durable_after_flush() {
        let path = tmp_path("buffered.wal");
        let (_, space) = location_with_desk();
        let events: Vec<Event> = (0..5)
            .map(|i| Event::BookingCreated {
                booking: booking_on(space.id, 1_767_258_000_000 + i * HOUR_MS),
            })
            .collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }
}
