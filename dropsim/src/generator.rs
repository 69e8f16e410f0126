use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Byte the malicious packet is filled with.
pub const MALICIOUS_BYTE: u8 = 0xff;

/// One simulated transmission: what the sender logged, which packets were
/// lost on the way, and what the receiver ended up seeing.
pub struct LoadGenerator {
    /// The logged packets.
    pub log: Vec<Vec<u8>>,
    /// The packets the receiver observed, in order.
    pub received: Vec<Vec<u8>>,
    /// Indices into the log of the dropped packets, ascending.
    pub dropped: Vec<usize>,
    /// The index of the logged packet that a malicious receiver replaced with
    /// a packet that was never sent. That packet is never dropped.
    pub malicious_i: Option<usize>,
}

impl LoadGenerator {
    /// The sender logs `num_logged` random packets of `packet_bytes` bytes.
    /// Each is dropped independently with probability `p_dropped`.
    pub fn new(
        rng: &mut ChaCha8Rng,
        num_logged: usize,
        packet_bytes: usize,
        p_dropped: f64,
        malicious: bool,
    ) -> Self {
        let malicious_packet = vec![MALICIOUS_BYTE; packet_bytes];
        let log: Vec<Vec<u8>> = (0..num_logged)
            .map(|_| loop {
                let packet: Vec<u8> = (0..packet_bytes).map(|_| rng.gen()).collect();
                if packet != malicious_packet {
                    break packet;
                }
            })
            .collect();
        let malicious_i = if malicious && num_logged > 0 {
            Some(rng.gen_range(0..num_logged))
        } else {
            None
        };

        let mut received = Vec::with_capacity(num_logged);
        let mut dropped = vec![];
        for (i, packet) in log.iter().enumerate() {
            if Some(i) == malicious_i {
                received.push(malicious_packet.clone());
            } else if rng.gen_bool(p_dropped) {
                dropped.push(i);
            } else {
                received.push(packet.clone());
            }
        }
        Self { log, received, dropped, malicious_i }
    }

    /// Convenience for a generator seeded from a fixed value.
    pub fn with_seed(
        seed: u64,
        num_logged: usize,
        packet_bytes: usize,
        p_dropped: f64,
        malicious: bool,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::new(&mut rng, num_logged, packet_bytes, p_dropped, malicious)
    }
}
