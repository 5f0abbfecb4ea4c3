use alloc::boxed::Box;
use alloc::collections::VecDeque;
use dasp_graph::Buffer;
use dasp_interpolate::linear::Linear;
use dasp_signal::Signal;
use log::{error, warn};
use rtrb::{Consumer, Producer, RingBuffer};

/// Pulls rendered console samples out of the ring buffer.
pub struct PicoSignal {
    buffer: Consumer<i16>,
}

impl PicoSignal {
    pub fn new(buffer: Consumer<i16>) -> Self {
        Self {
            buffer,
        }
    }
}

impl Signal for PicoSignal {
    type Frame = f32;

    fn next(&mut self) -> Self::Frame {
        if let Ok(sample) = self.buffer.pop() {
            sample as f32 / 32768.0
        } else {
            warn!(target: "synth", "audio ring buffer underrun");
            0.0
        }
    }

    fn is_exhausted(&self) -> bool {
        self.buffer.slots() < 64
    }
}

/// Bridge between the step thread, which renders samples at the console rate,
/// and a device callback that wants `Buffer`s at its own rate.
pub struct PicoAudio {
    input: Producer<i16>,
    resampler: Box<dyn Signal<Frame = f32> + Send>,
    pending: VecDeque<f32>,
    output: Producer<Buffer>,
    device_end: Option<Consumer<Buffer>>,
}

impl PicoAudio {
    /// `sample_rate` is what the synth renders at, `device_rate` what the
    /// consumer of `take_output` plays at.
    pub fn new(sample_rate: f64, device_rate: f64) -> Self {
        // a little over a quarter second at the default rate
        let (input, ring) = RingBuffer::<i16>::new(8192);
        let (output, device_end) = RingBuffer::<Buffer>::new(1024);

        let resampler = PicoSignal::new(ring).from_hz_to_hz(Linear::new(0.0, 0.0), sample_rate, device_rate);

        Self {
            input,
            resampler: Box::new(resampler),
            pending: VecDeque::with_capacity(Buffer::LEN * 4),
            output,
            device_end: Some(device_end),
        }
    }

    /// Hands the consumer half to the device thread. Only the first call
    /// returns `Some`.
    pub fn take_output(&mut self) -> Option<Consumer<Buffer>> {
        self.device_end.take()
    }

    /// Queues freshly rendered samples, returning how many fit.
    pub fn push_samples(&mut self, samples: &[i16]) -> usize {
        let room = self.input.slots().min(samples.len());
        for &s in &samples[..room] {
            // room was checked above
            let _ = self.input.push(s);
        }
        if room < samples.len() {
            error!(target: "synth", "audio ring full, {} samples dropped", samples.len() - room);
        }
        room
    }

    /// Resamples whatever is queued and packs it into device buffers.
    pub fn convert_to_output_buffers(&mut self) {
        while !self.resampler.is_exhausted() {
            self.pending.push_back(self.resampler.next());
        }

        while self.pending.len() >= Buffer::LEN && self.output.slots() >= 8 {
            let mut buf = Buffer::SILENT;
            for (b, v) in buf.iter_mut().zip(self.pending.drain(..Buffer::LEN)) {
                *b = v;
            }
            if self.output.push(buf).is_err() {
                warn!(target: "synth", "output queue full, dropping a buffer");
            }
        }
    }
}
