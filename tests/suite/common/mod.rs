use std::collections::HashMap;

use profsym::obj::Frame;
use profsym::obj::ObjFile;
use profsym::obj::ObjTool;
use profsym::obj::OpenRequest;
use profsym::Addr;
use profsym::Error;
use profsym::IntoError as _;
use profsym::Mapping;
use profsym::Profile;
use profsym::Result;


pub const SERVER: &str = "/usr/bin/server";
pub const LIBCXX: &str = "/usr/lib/libstdc++.so.6";
pub const MISSING: &str = "/usr/lib/libmissing.so";

pub const SERVER_PROCESS: &str = "_ZN6server7processEv";
pub const VECTOR_PUSH_BACK: &str = "_ZNSt6vectorIiSaIiEE9push_backERKi";


/// A function symbol covering `[start, end)` in binary relative terms.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub start: Addr,
    pub end: Addr,
    pub frames: Vec<Frame>,
}

/// A fake binary.
#[derive(Clone, Debug, Default)]
pub struct Binary {
    pub build_id: String,
    pub symbols: Vec<Symbol>,
}


pub fn frame(func: &str, file: &str, line: u32) -> Frame {
    Frame {
        func: func.to_string(),
        file: file.to_string(),
        line,
        column: 0,
    }
}


/// An object tool serving fake binaries from memory.
#[derive(Clone, Debug, Default)]
pub struct TestObjTool {
    binaries: HashMap<String, Binary>,
}

impl TestObjTool {
    pub fn add(mut self, file: &str, binary: Binary) -> Self {
        let _prev = self.binaries.insert(file.to_string(), binary);
        self
    }
}

impl ObjTool for TestObjTool {
    fn open(&self, req: &OpenRequest<'_>) -> Result<Box<dyn ObjFile>> {
        let binary = self
            .binaries
            .get(req.file)
            .ok_or_else(|| Error::with_not_found(format!("{}: no such file", req.file)))?;

        Ok(Box::new(TestObjFile {
            name: req.file.to_string(),
            binary: binary.clone(),
            start: req.start,
            offset: req.offset,
            fast: req.fast,
        }))
    }
}


#[derive(Debug)]
struct TestObjFile {
    name: String,
    binary: Binary,
    start: Addr,
    offset: u64,
    fast: bool,
}

impl ObjFile for TestObjFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_id(&self) -> &str {
        &self.binary.build_id
    }

    fn obj_addr(&self, addr: Addr) -> Result<Addr> {
        addr.checked_sub(self.start)
            .map(|addr| addr + self.offset)
            .ok_or_invalid_input(|| format!("address {addr:#x} precedes mapping"))
    }

    fn source_line(&self, addr: Addr) -> Result<Vec<Frame>> {
        let frames = self
            .binary
            .symbols
            .iter()
            .find(|sym| (sym.start..sym.end).contains(&addr))
            .map(|sym| sym.frames.clone())
            .unwrap_or_default();

        if self.fast {
            let frames = frames
                .into_iter()
                .map(|frame| Frame {
                    func: frame.func,
                    ..Default::default()
                })
                .collect();
            Ok(frames)
        } else {
            Ok(frames)
        }
    }
}


/// The object tool knowing about the binaries of [`test_profile`].
pub fn obj_tool() -> TestObjTool {
    TestObjTool::default()
        .add(
            SERVER,
            Binary {
                build_id: "5e7e7".to_string(),
                symbols: vec![
                    Symbol {
                        start: 0x1000,
                        end: 0x1100,
                        frames: vec![frame("main", "server.cc", 12)],
                    },
                    Symbol {
                        start: 0x1100,
                        end: 0x1200,
                        // `process` got inlined into `main`.
                        frames: vec![
                            frame(SERVER_PROCESS, "process.cc", 40),
                            frame("main", "server.cc", 14),
                        ],
                    },
                ],
            },
        )
        .add(
            LIBCXX,
            Binary {
                build_id: String::new(),
                symbols: vec![Symbol {
                    start: 0x2000,
                    end: 0x2100,
                    frames: vec![frame(VECTOR_PUSH_BACK, "stl_vector.h", 1198)],
                }],
            },
        )
}

/// A profile with three mappings: the main binary, a shared library,
/// and a library that cannot be found locally.
pub fn test_profile() -> Profile {
    let mut profile = Profile::default();
    let server = profile.add_mapping(Mapping {
        start: 0x400000,
        limit: 0x500000,
        file: SERVER.to_string(),
        build_id: "5e7e7".to_string(),
        ..Default::default()
    });
    let libcxx = profile.add_mapping(Mapping {
        start: 0x7f0000,
        limit: 0x800000,
        file: LIBCXX.to_string(),
        ..Default::default()
    });
    let missing = profile.add_mapping(Mapping {
        start: 0x900000,
        limit: 0x910000,
        file: MISSING.to_string(),
        ..Default::default()
    });

    let _idx = profile.add_location(Some(server), 0x401010);
    let _idx = profile.add_location(Some(server), 0x401120);
    let _idx = profile.add_location(Some(server), 0x401018);
    let _idx = profile.add_location(Some(libcxx), 0x7f2010);
    let _idx = profile.add_location(Some(missing), 0x900100);
    let _idx = profile.add_location(Some(missing), 0x900200);
    profile
}

/// Retrieve the names of the functions `profile`'s location at `idx`
/// resolves to, innermost first.
pub fn names(profile: &Profile, idx: usize) -> Vec<String> {
    profile.locations[idx]
        .lines
        .iter()
        .filter_map(|line| profile.function(line.function))
        .map(|function| function.name.clone())
        .collect()
}
