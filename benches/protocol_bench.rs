use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pdm_radio_link::message::{fragment_message, MessageAssembler};
use pdm_radio_link::{Address, LogicalMessage, MessageSequence, PacketSequence, PacketType, RadioPacket};

fn local() -> Address {
    Address(0x1000_0000)
}

fn pod() -> Address {
    Address(0x2000_0000)
}

fn benchmark_packet_encode(c: &mut Criterion) {
    let packet = RadioPacket::new(local(), PacketType::Pod, PacketSequence::new(17), vec![1, 2, 3, 4, 5]);

    c.bench_function("encode_single_packet", |b| {
        b.iter(|| packet.encode());
    });
}

fn benchmark_packet_decode(c: &mut Criterion) {
    let packet = RadioPacket::new(local(), PacketType::Pod, PacketSequence::new(17), vec![1, 2, 3, 4, 5]);
    let wire = packet.encode();

    c.bench_function("decode_single_packet", |b| {
        b.iter(|| RadioPacket::parse(black_box(&wire)));
    });
}

fn benchmark_sequence_arithmetic(c: &mut Criterion) {
    c.bench_function("packet_sequence_advance_one_cycle", |b| {
        b.iter(|| {
            let mut seq = PacketSequence::new(0);
            for _ in 0..32 {
                seq = seq.next();
            }
            black_box(seq)
        });
    });
}

fn benchmark_fragment_message(c: &mut Criterion) {
    let body = vec![0u8; 500];
    let message = LogicalMessage::new(MessageSequence::new(3), pod(), body);

    c.bench_function("fragment_500_byte_message", |b| {
        b.iter(|| fragment_message(black_box(&message), pod(), local(), PacketSequence::new(0)));
    });
}

fn benchmark_fragment_and_reassemble_round_trip(c: &mut Criterion) {
    let body = vec![7u8; 300];
    let message = LogicalMessage::new(MessageSequence::new(1), pod(), body);

    c.bench_function("fragment_and_reassemble_300_byte_message", |b| {
        b.iter(|| {
            let packets = fragment_message(&message, pod(), local(), PacketSequence::new(0));
            let mut assembler = MessageAssembler::new();
            let mut result = None;
            for packet in &packets {
                result = assembler.add_packet(black_box(packet)).unwrap();
            }
            result
        });
    });
}

criterion_group!(
    benches,
    benchmark_packet_encode,
    benchmark_packet_decode,
    benchmark_sequence_arithmetic,
    benchmark_fragment_message,
    benchmark_fragment_and_reassemble_round_trip,
);
criterion_main!(benches);
