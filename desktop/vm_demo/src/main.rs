/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{sync::Arc, thread, time::Instant};

use env_logger::{Builder, Env};
use log::{error, info};
use nachos_vm::{
    modules::{
        executable::{ExecutableModule, InMemoryExecutableModule},
        swap_storage::FileSwapStorageModule,
    },
    AddressSpace, PagingMode, VMConfig, VirtualMemory,
};
use rand::{rngs::SmallRng, Rng, RngCore, SeedableRng};

const PROCESS_COUNT: u64 = 4;
const ACCESSES_PER_PROCESS: usize = 2000;

type DemoVM = VirtualMemory<FileSwapStorageModule>;

fn build_executable(rand: &mut SmallRng, page_size: usize) -> (InMemoryExecutableModule, Vec<u8>) {
    let mut text = vec![0u8; rand.gen_range(2..6) * page_size];
    rand.fill_bytes(&mut text);
    let mut data = vec![0u8; rand.gen_range(1..4) * page_size + 100];
    rand.fill_bytes(&mut data);

    let executable = InMemoryExecutableModule::new(page_size)
        .with_section(".text", text.clone(), true)
        .with_section(".data", data.clone(), false)
        .with_entry_point(0);

    let mut image = text;
    image.extend_from_slice(&data);
    (executable, image)
}

/// Runs a random mix of reads and writes against a shadow copy of the address space
fn run_process(vm: &Arc<DemoVM>, seed: u64, mode: PagingMode) -> Result<(), String> {
    let page_size = vm.config().page_size;
    let mut rand = SmallRng::seed_from_u64(seed);
    let (executable, mut shadow) = build_executable(&mut rand, page_size);
    let text_size = executable.sections()[0].page_count * page_size;

    let name = format!("proc{}", seed);
    let args = [name.as_str(), "--demo"];
    let space = AddressSpace::load(vm.clone(), Box::new(executable), &args, mode)
        .map_err(|err| format!("could not load {}: {:?}", name, err))?;

    // data section is padded to whole pages, the stack follows
    let stack_end = space.image().initial_sp as usize;
    shadow.resize(page_align(shadow.len(), page_size), 0);
    shadow.resize(stack_end, 0);

    let argv = space.image().argv;
    let mut pointer = [0u8; 4];
    space.read_virtual_memory_all(argv, &mut pointer);
    let arg0 = space.read_virtual_memory_string(u32::from_le_bytes(pointer) as i32, 64);
    if arg0.as_deref() != Some(name.as_str()) {
        return Err(format!("{} sees argv[0] = {:?}", name, arg0));
    }

    for _ in 0..ACCESSES_PER_PROCESS {
        let start = rand.gen_range(0..stack_end);
        let len = rand.gen_range(1..3 * page_size);
        let end = (start + len).min(stack_end);

        if rand.gen_bool(0.3) && start >= text_size {
            let mut data = vec![0u8; end - start];
            rand.fill_bytes(&mut data);
            let written = space.write_virtual_memory_all(start as i32, &data);
            if written != data.len() {
                return Err(format!("{} wrote {} of {} bytes", name, written, data.len()));
            }
            shadow[start..end].copy_from_slice(&data);
        } else {
            let mut data = vec![0u8; end - start];
            let read = space.read_virtual_memory_all(start as i32, &mut data);
            if read != data.len() || data != shadow[start..end] {
                return Err(format!("{} read wrong content at {:#x}", name, start));
            }
        }
    }

    info!("{} finished", name);
    Ok(())
}

fn page_align(len: usize, page_size: usize) -> usize {
    (len + page_size - 1) / page_size * page_size
}

fn main() {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let config = VMConfig {
        frame_count: 24,
        ..Default::default()
    };
    let storage = match FileSwapStorageModule::new("/tmp/vm_demo.swap".to_string()) {
        Ok(storage) => storage,
        Err(err) => {
            error!("could not create swap file: {}", err);
            return;
        }
    };
    let vm: Arc<DemoVM> = Arc::new(VirtualMemory::new(config, storage));

    let start = Instant::now();
    thread::scope(|scope| {
        let mut handles = Vec::new();
        for seed in 0..PROCESS_COUNT {
            let vm = &vm;
            handles.push(scope.spawn(move || run_process(vm, seed, PagingMode::Demand)));
        }

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(msg)) => error!("{}", msg),
                Err(_) => error!("process thread panicked"),
            }
        }
    });
    let elapsed = start.elapsed();

    // an eager process only runs if all of its pages fit at once
    if let Err(msg) = run_process(&vm, PROCESS_COUNT, PagingMode::Eager) {
        error!("{}", msg);
    }

    match vm.stats() {
        Ok(stats) => println!("{:#?}", stats),
        Err(()) => error!("could not read statistics"),
    }
    // violations are logged by the check itself
    if vm.check_frame_accounting().is_err() {
        error!("virtual memory state is inconsistent");
    }

    println!("demand paged processes finished in {}ms", elapsed.as_millis());
}
