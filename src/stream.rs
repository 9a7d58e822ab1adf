use std::ops::Range;

use crate::backend::{PipelineStage, TimestampBackend};

pub const SLOTS_PER_STREAM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
    /// Submitted, but its results are no longer wanted. The device owns the
    /// recorder until the fence signals; nothing records into it until then.
    Abandoned,
}

pub struct StreamSlot<R> {
    pub(crate) recorder: R,
    pub(crate) state: SlotState,
    pub(crate) frame_id: u64,
    /// Start ids of every zone written this submission; end id is start + 1.
    pub(crate) start_ids: Vec<u32>,
}

impl<R> StreamSlot<R> {
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Smallest id range covering every pair written to this slot.
    pub fn query_range(&self) -> Option<Range<u32>> {
        let lo = *self.start_ids.iter().min()?;
        let hi = *self.start_ids.iter().max()?;
        Some(lo..hi + 2)
    }

    /// Gets the slot recording `frame_id`, beginning the recorder on the
    /// first write of the frame. False while an earlier submission still
    /// owns the recorder.
    fn open_for<B>(&mut self, backend: &mut B, frame_id: u64) -> bool
    where
        B: TimestampBackend<Recorder = R>,
    {
        match self.state {
            SlotState::Recording if self.frame_id == frame_id => return true,
            SlotState::Submitted | SlotState::Abandoned => return false,
            // left over from a frame that was never submitted
            SlotState::Recording => backend.discard(&mut self.recorder),
            SlotState::Idle => {}
        }
        backend.begin(&mut self.recorder);
        self.state = SlotState::Recording;
        self.frame_id = frame_id;
        self.start_ids.clear();
        true
    }
}

/// Raw values read back for one zone entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPair {
    pub start_id: u32,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone)]
pub struct FinishedSlot {
    pub frame_id: u64,
    pub pairs: Vec<ResolvedPair>,
}

pub enum Readback {
    /// Nothing submitted on this slot.
    Empty,
    /// Submitted, fence not signaled yet.
    Pending,
    Ready(FinishedSlot),
}

/// Double-buffered command recording surface for one named context.
///
/// Frame N records into slot `N % 2` while the other slot may still be
/// executing on the device.
pub struct CommandStreamBinding<R> {
    name: String,
    slots: [StreamSlot<R>; SLOTS_PER_STREAM],
}

pub fn slot_for_frame(frame_id: u64) -> usize {
    (frame_id % SLOTS_PER_STREAM as u64) as usize
}

impl<R> CommandStreamBinding<R> {
    pub fn new<B>(backend: &mut B, name: &str) -> anyhow::Result<Self>
    where
        B: TimestampBackend<Recorder = R>,
    {
        let mut make = |slot| -> anyhow::Result<StreamSlot<R>> {
            Ok(StreamSlot {
                recorder: backend.create_recorder(name, slot)?,
                state: SlotState::Idle,
                frame_id: 0,
                start_ids: Vec::new(),
            })
        };
        let slots = [make(0)?, make(1)?];
        Ok(Self {
            name: name.to_string(),
            slots,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self, index: usize) -> &StreamSlot<R> {
        &self.slots[index]
    }

    /// Recorder of the frame being recorded, if anything was written to it yet.
    pub fn recording_recorder_mut(&mut self, frame_id: u64) -> Option<&mut R> {
        let slot = &mut self.slots[slot_for_frame(frame_id)];
        let recording = slot.state == SlotState::Recording && slot.frame_id == frame_id;
        recording.then_some(&mut slot.recorder)
    }

    /// False while the frame's slot still belongs to an earlier submission.
    pub fn can_record(&self, frame_id: u64) -> bool {
        let slot = &self.slots[slot_for_frame(frame_id)];
        !matches!(slot.state, SlotState::Submitted | SlotState::Abandoned)
    }

    /// Writes a timestamp into the frame's slot. Returns false, writing
    /// nothing, when the slot is still busy.
    pub fn write<B>(
        &mut self,
        backend: &mut B,
        frame_id: u64,
        query_id: u32,
        stage: PipelineStage,
        is_start: bool,
    ) -> bool
    where
        B: TimestampBackend<Recorder = R>,
    {
        let slot = &mut self.slots[slot_for_frame(frame_id)];
        if !slot.open_for(backend, frame_id) {
            return false;
        }
        backend.write_timestamp(&mut slot.recorder, query_id, stage);
        if is_start {
            slot.start_ids.push(query_id);
        }
        true
    }

    /// Like [`write`](Self::write), but the timestamp goes into a
    /// caller-owned command buffer. The frame's slot still resolves it, so
    /// `target` has to be submitted before the slot is.
    pub fn write_into<B>(
        &mut self,
        backend: &mut B,
        target: &mut B::Target,
        frame_id: u64,
        query_id: u32,
        stage: PipelineStage,
        is_start: bool,
    ) -> bool
    where
        B: TimestampBackend<Recorder = R>,
    {
        let slot = &mut self.slots[slot_for_frame(frame_id)];
        if !slot.open_for(backend, frame_id) {
            return false;
        }
        backend.write_timestamp_into(target, query_id, stage);
        if is_start {
            slot.start_ids.push(query_id);
        }
        true
    }

    /// Submits the frame's slot. Returns false when nothing was recorded.
    pub fn submit<B>(&mut self, backend: &mut B, frame_id: u64) -> bool
    where
        B: TimestampBackend<Recorder = R>,
    {
        let slot = &mut self.slots[slot_for_frame(frame_id)];
        if slot.state != SlotState::Recording || slot.frame_id != frame_id {
            return false;
        }
        match slot.query_range() {
            Some(range) => {
                backend.submit(&mut slot.recorder, range);
                slot.state = SlotState::Submitted;
            }
            None => {
                backend.discard(&mut slot.recorder);
                slot.state = SlotState::Idle;
            }
        }
        true
    }

    /// Reads back the slot if its fence has signaled, returning it to idle.
    /// Abandoned slots are released the same way, with their values dropped.
    pub(crate) fn read_slot<B>(&mut self, backend: &mut B, index: usize) -> Readback
    where
        B: TimestampBackend<Recorder = R>,
    {
        let slot = &mut self.slots[index];
        let abandoned = match slot.state {
            SlotState::Submitted => false,
            SlotState::Abandoned => true,
            SlotState::Idle | SlotState::Recording => return Readback::Empty,
        };
        if !backend.results_ready(&slot.recorder) {
            return if abandoned {
                Readback::Empty
            } else {
                Readback::Pending
            };
        }
        if abandoned {
            log::debug!(
                "stream `{}`: released abandoned frame {}",
                self.name,
                slot.frame_id
            );
            backend.discard(&mut slot.recorder);
            slot.state = SlotState::Idle;
            slot.start_ids.clear();
            return Readback::Empty;
        }
        slot.state = SlotState::Idle;
        let Some(range) = slot.query_range() else {
            return Readback::Empty;
        };
        let start_ids = std::mem::take(&mut slot.start_ids);

        let values = match backend.read_query_values(&mut slot.recorder, range.clone()) {
            Ok(values) => values,
            Err(e) => {
                log::error!(
                    "stream `{}`: reading back frame {} failed: {e:#}",
                    self.name,
                    slot.frame_id
                );
                return Readback::Empty;
            }
        };

        let value_at = |id: u32| values.get((id - range.start) as usize).copied();
        let mut pairs = Vec::with_capacity(start_ids.len());
        for start_id in start_ids {
            match (value_at(start_id), value_at(start_id + 1)) {
                (Some(start), Some(end)) => pairs.push(ResolvedPair {
                    start_id,
                    start,
                    end,
                }),
                _ => log::warn!(
                    "stream `{}`: no value for queries {start_id}..{} \
                     (got {} values for {range:?})",
                    self.name,
                    start_id + 2,
                    values.len()
                ),
            }
        }
        Readback::Ready(FinishedSlot {
            frame_id: slot.frame_id,
            pairs,
        })
    }

    /// Gives up on the slot's results without waiting on the device. A
    /// submitted slot stays out of use until its fence signals.
    pub(crate) fn abandon_slot<B>(&mut self, backend: &mut B, index: usize)
    where
        B: TimestampBackend<Recorder = R>,
    {
        let slot = &mut self.slots[index];
        match slot.state {
            SlotState::Submitted => slot.state = SlotState::Abandoned,
            SlotState::Recording => {
                backend.discard(&mut slot.recorder);
                slot.state = SlotState::Idle;
            }
            SlotState::Idle | SlotState::Abandoned => {}
        }
        slot.start_ids.clear();
    }
}
