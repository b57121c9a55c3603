#![allow(dead_code)]

use avrsim::assembler::{self, Image};
use avrsim::vm::{Instance, State};

/// Wraps a data section and a `main` body into a complete program.
pub fn program(data: &str, body: &str) -> String {
    format!(
        ".section .data\n{}\n.section .text\n.global main\nmain:\n{}\n.end\n",
        data, body
    )
}

pub fn assemble(src: &str) -> Image {
    match assembler::assemble(src, None) {
        Ok(image) => image,
        Err(err) => panic!("assembly failed: {}\n{}", err, src),
    }
}

pub fn run_src(src: &str) -> Instance<String> {
    let mut vm = Instance::new(&assemble(src), String::new());
    vm.run();
    vm
}

/// Runs `body` and checks it finished cleanly.
pub fn run(body: &str) -> Instance<String> {
    let vm = run_src(&program("", body));
    assert_eq!(vm.state(), State::Finished, "{:?}", vm.error());
    vm
}
