// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use vmcore::core::config::MemoryLayout;
use vmcore::core::cpu::{decode, encode, CPU};
use vmcore::core::executor::{BlockCache, CompiledBlock};
use vmcore::core::{ExecutorKind, Machine, MachineConfig};

const PROGRAM_ADDRESS: u32 = 0x8000_1000;

/// Arithmetic loop with a load and a store per iteration
fn workload() -> Vec<u32> {
    let mut program = Vec::new();
    program.extend(encode::li(9, 0x8000_0100));
    program.extend([
        encode::addiu(3, 0, 0),
        // loop:
        encode::lw(4, 9, 0),
        encode::addiu(3, 3, 1),
        encode::addu(4, 4, 3),
        encode::sw(4, 9, 0),
        encode::xor(5, 4, 3),
        encode::sll(6, 5, 2),
        encode::beq(0, 0, -7),
        encode::NOP,
    ]);
    program
}

fn machine(kind: ExecutorKind) -> Machine {
    let config = MachineConfig {
        executor: kind,
        memory: Some(MemoryLayout {
            ram_size: 0x10_0000,
            vram_size: 0x1000,
            sound_ram_size: 0x1000,
            boot_rom_size: 0x1000,
            flash_size: 0x1000,
        }),
        ..MachineConfig::default()
    };
    let mut machine = Machine::new(config).unwrap();
    machine.load_program(PROGRAM_ADDRESS, &workload()).unwrap();
    machine.set_entry_point(PROGRAM_ADDRESS);
    machine
}

fn strategy_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy");

    for kind in [ExecutorKind::Interpreter, ExecutorKind::Recompiler] {
        group.bench_with_input(
            BenchmarkId::new("run_100k_cycles", format!("{:?}", kind)),
            &kind,
            |b, &kind| {
                let mut machine = machine(kind);
                b.iter(|| {
                    let target = machine.cycles() + 100_000;
                    black_box(machine.run_until(target).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn cpu_register_access_benchmark(c: &mut Criterion) {
    c.bench_function("cpu_register_read", |b| {
        let cpu = CPU::new();
        b.iter(|| {
            for i in 0..32 {
                black_box(cpu.reg(i));
            }
        });
    });

    c.bench_function("cpu_register_write", |b| {
        let mut cpu = CPU::new();
        b.iter(|| {
            for i in 0..32 {
                cpu.set_reg(i, black_box(i as u32 * 100));
            }
        });
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let words = workload();
    c.bench_function("decode_workload", |b| {
        b.iter(|| {
            for &word in &words {
                black_box(decode(black_box(word)));
            }
        });
    });
}

fn block_cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_cache");

    let block = |vaddr: u32| CompiledBlock {
        vaddr,
        paddr: vaddr & 0x1FFF_FFFF,
        generation: 0,
        ops: workload().into_iter().map(|w| (decode(w), 1)).collect(),
        segments: Vec::new(),
    };

    group.bench_function("lookup_hit", |b| {
        let mut cache = BlockCache::new(4096);
        cache.insert(block(PROGRAM_ADDRESS)).unwrap();
        b.iter(|| black_box(cache.lookup(black_box(PROGRAM_ADDRESS))));
    });

    for count in [10u32, 100].iter() {
        group.bench_with_input(BenchmarkId::new("fill", count), count, |b, &count| {
            b.iter(|| {
                let mut cache = BlockCache::new(4096);
                for i in 0..count {
                    cache.insert(block(PROGRAM_ADDRESS + i * 0x40)).unwrap();
                }
                black_box(cache.len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    strategy_benchmark,
    cpu_register_access_benchmark,
    decode_benchmark,
    block_cache_benchmark
);
criterion_main!(benches);
