#![no_main]

use classmend::classfile::{read_header, ClassFile, ClassWriter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = read_header(data);
    if let Ok(mut class) = ClassFile::parse(data) {
        let pool = class.pool.clone();
        for method in &mut class.methods {
            let _ = method.load_code(&pool);
        }
        let _ = ClassWriter::new().write(&class);
    }
});
