// Record sources and sinks around the engine
//
// A source is any iterator of `Result<FeatureRecord, FeedError>`; a sink
// consumes priced records one at a time in arrival order.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::FeedError;
use crate::types::{FeatureRecord, Location, PriceRecord, Unit, UnitId};

// === SINKS ===

pub trait RecordSink {
    fn accept(&mut self, record: &PriceRecord) -> Result<(), FeedError>;

    fn flush(&mut self) -> Result<(), FeedError> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub records: Vec<PriceRecord>,
}

impl RecordSink for VecSink {
    fn accept(&mut self, record: &PriceRecord) -> Result<(), FeedError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn accept(&mut self, record: &PriceRecord) -> Result<(), FeedError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FeedError> {
        self.writer.flush()?;
        Ok(())
    }
}

// === JSONL SOURCE ===

/// Feature records, one JSON object per line. Blank lines are ignored.
///
/// A line that is not UTF-8 or not a feature record is reported with its
/// 1-based line number and reading continues with the next line.
pub struct JsonLinesSource<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    line: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = Result<FeatureRecord, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(FeedError::Io(err))),
            }
            self.line += 1;
            let line = self.line;

            let text = match std::str::from_utf8(&self.buf) {
                Ok(text) => text,
                Err(source) => return Some(Err(FeedError::Utf8 { line, source })),
            };
            if text.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(text).map_err(|source| FeedError::Decode { line, source }),
            );
        }
    }
}

// === SYNTHETIC FEED ===

/// Spacing between neighboring grid units, in degrees.
const GRID_SPACING: f64 = 0.002;
const SPECIAL_DAY_PROBABILITY: f64 = 0.1;
const MAX_QUEUE: u32 = 15;
/// Bike, car, truck.
const VEHICLE_WEIGHTS: [f64; 3] = [0.5, 1.0, 1.5];

/// Seeded generator of plausible feature records for a square grid of units.
///
/// Each tick yields one record per unit in id order; the special-day flag is
/// drawn once per tick and shared by all units.
pub struct SyntheticFeed {
    rng: StdRng,
    units: Vec<Unit>,
    ticks: u64,
    tick: u64,
    cursor: usize,
    special_day: bool,
}

impl SyntheticFeed {
    pub fn new(num_units: usize, ticks: u64, seed: u64) -> Self {
        Self::around(Location::new(26.1445, 91.7362), num_units, ticks, seed)
    }

    pub fn around(centre: Location, num_units: usize, ticks: u64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let side = (num_units as f64).sqrt().ceil().max(1.0) as usize;
        let offset = (side as f64 - 1.0) / 2.0;

        let units = (0..num_units)
            .map(|i| {
                let row = (i / side) as f64 - offset;
                let col = (i % side) as f64 - offset;
                let location = Location::new(
                    centre.latitude + row * GRID_SPACING,
                    centre.longitude + col * GRID_SPACING,
                );
                let capacity = rng.random_range(20..=120);
                Unit::new(UnitId::new(i as u32), location, capacity)
            })
            .collect();

        Self {
            rng,
            units,
            ticks,
            tick: 0,
            cursor: 0,
            special_day: false,
        }
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Records not yet yielded.
    pub fn remaining(&self) -> usize {
        let total = self.units.len() as u64 * self.ticks;
        let done = self.units.len() as u64 * self.tick + self.cursor as u64;
        total.saturating_sub(done) as usize
    }

    fn observe(&mut self, unit: Unit) -> FeatureRecord {
        let capacity = unit.capacity.max(1);
        let occupancy = self.rng.random_range(0..=capacity);
        let weight_index = self.rng.random_range(0..VEHICLE_WEIGHTS.len());

        FeatureRecord {
            timestamp: format!("t{:05}", self.tick),
            unit_id: unit.id,
            occupancy_rate: occupancy as f64 / capacity as f64,
            queue_length: self.rng.random_range(0..=MAX_QUEUE),
            traffic_level: self.rng.random_range(1..=10),
            is_special_day: self.special_day,
            vehicle_weight: VEHICLE_WEIGHTS[weight_index],
            occupancy: i64::from(occupancy),
            capacity: i64::from(capacity),
            latitude: unit.location.latitude,
            longitude: unit.location.longitude,
        }
    }
}

impl Iterator for SyntheticFeed {
    type Item = FeatureRecord;

    fn next(&mut self) -> Option<FeatureRecord> {
        if self.units.is_empty() || self.tick >= self.ticks {
            return None;
        }
        if self.cursor == 0 {
            self.special_day = self.rng.random_bool(SPECIAL_DAY_PROBABILITY);
        }

        let unit = self.units[self.cursor];
        let record = self.observe(unit);

        self.cursor += 1;
        if self.cursor == self.units.len() {
            self.cursor = 0;
            self.tick += 1;
        }
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

// === INITIALIZATION ===

/// Location and capacity from each unit's first valid record, ordered by id.
/// Records failing `FeatureRecord::validate` never fix a unit's site.
pub fn sites_from_records(records: &[FeatureRecord]) -> Vec<Unit> {
    let mut sites: BTreeMap<UnitId, Unit> = BTreeMap::new();
    for r in records.iter().filter(|r| r.validate().is_ok()) {
        sites.entry(r.unit_id).or_insert_with(|| {
            let capacity = u32::try_from(r.capacity.max(0)).unwrap_or(u32::MAX);
            Unit::new(r.unit_id, r.location(), capacity)
        });
    }
    sites.into_values().collect()
}
