//! Host program for the preload tests. Runs one scenario named by its first
//! argument against plain libc, then leaves through `exit` so the layer
//! prints its report.

use libc::{c_char, c_int};
use std::io::Write;

const DATA: &std::ffi::CStr = c"data.txt";

fn main() {
    let scenario = std::env::args().nth(1).unwrap_or_default();
    let status = match scenario.as_str() {
        "read" => read_scenario(),
        "fread" => fread_scenario(),
        "stdio" => stdio_scenario(),
        "bad-mode" => bad_mode_scenario(),
        "baseline" => 0,
        other => {
            eprintln!("unknown scenario `{other}`");
            2
        }
    };
    unsafe { libc::exit(status) }
}

fn emit(bytes: &[u8]) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(bytes);
    let _ = stdout.flush();
}

fn read_scenario() -> c_int {
    let mut buf = [0u8; 64];
    unsafe {
        let fd = libc::open(DATA.as_ptr(), libc::O_RDONLY);
        if fd < 0 {
            return 1;
        }
        let n = libc::read(fd, buf.as_mut_ptr().cast(), buf.len());
        libc::close(fd);
        if n < 0 {
            return 1;
        }
        emit(&buf[..n as usize]);
    }
    0
}

fn fread_scenario() -> c_int {
    let mut buf = [0u8; 64];
    unsafe {
        let stream = libc::fopen(DATA.as_ptr(), c"r".as_ptr());
        if stream.is_null() {
            return 1;
        }
        let n = libc::fread(buf.as_mut_ptr().cast(), 1, buf.len(), stream);
        libc::fclose(stream);
        emit(&buf[..n]);
    }
    0
}

/// Stream buffers are allocated by the first write and released by
/// `fclose`, so every byte should come back.
fn stdio_scenario() -> c_int {
    let outputs: [*const c_char; 3] = [
        c"out-0.txt".as_ptr(),
        c"out-1.txt".as_ptr(),
        c"out-2.txt".as_ptr(),
    ];
    for path in outputs {
        unsafe {
            let stream = libc::fopen(path, c"w".as_ptr());
            if stream.is_null() {
                return 1;
            }
            libc::fputs(c"buffered line\n".as_ptr(), stream);
            if libc::fclose(stream) != 0 {
                return 1;
            }
        }
    }
    0
}

fn bad_mode_scenario() -> c_int {
    let stream = unsafe { libc::fopen(DATA.as_ptr(), c"q".as_ptr()) };
    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let result = if stream.is_null() { "null" } else { "stream" };
    emit(format!("{result} errno={errno}").as_bytes());
    0
}
