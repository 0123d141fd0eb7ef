use std::cell::RefCell;
use std::rc::Rc;

use profsym::remote::MappingSource;
use profsym::remote::MappingSources;
use profsym::CollectDiagnostics;
use profsym::Diagnostics;
use profsym::ErrorKind;
use profsym::Function;
use profsym::FunctionId;
use profsym::Line;
use profsym::Profile;
use profsym::Result;
use profsym::Symbolizer;

use test_log::test;

use crate::suite::common::names;
use crate::suite::common::obj_tool;
use crate::suite::common::test_profile;
use crate::suite::common::MISSING;
#[cfg(feature = "demangle")]
use crate::suite::common::SERVER_PROCESS;
use crate::suite::common::VECTOR_PUSH_BACK;


/// Create a diagnostics sink that can be handed to a [`Symbolizer`]
/// while still allowing inspection of the reported messages.
fn diagnostics() -> (Rc<CollectDiagnostics>, impl Diagnostics + 'static) {
    let diag = Rc::new(CollectDiagnostics::new());
    let sink = {
        let diag = Rc::clone(&diag);
        move |msg: &str| diag.print_err(msg)
    };
    (diag, sink)
}

fn sorted_comments(profile: &Profile) -> Vec<String> {
    let mut comments = profile.comments.clone();
    let () = comments.sort();
    comments
}


/// Check that we can symbolize a profile using local binaries.
#[test]
fn symbolize_local() {
    let (diag, sink) = diagnostics();
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(sink)
        .build();

    let mut profile = test_profile();
    let () = symbolizer
        .symbolize("local", &MappingSources::new(), &mut profile)
        .unwrap();

    assert_eq!(names(&profile, 0), vec!["main"]);
    assert_eq!(
        names(&profile, 1),
        vec!["_ZN6server7processEv".to_string(), "main".to_string()]
    );
    assert_eq!(names(&profile, 2), vec!["main"]);
    assert_eq!(names(&profile, 3), vec![VECTOR_PUSH_BACK]);
    assert!(names(&profile, 4).is_empty());
    assert!(names(&profile, 5).is_empty());

    let lines = profile.locations[1]
        .lines
        .iter()
        .map(|line| line.line)
        .collect::<Vec<_>>();
    assert_eq!(lines, vec![40, 14]);

    // `main` is shared between locations.
    assert_eq!(profile.functions.len(), 3);
    // Without demangling display names are the raw ones.
    assert!(profile
        .functions
        .iter()
        .all(|function| function.name == function.system_name));

    let messages = diag.messages();
    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(
        messages[0].starts_with("Local symbolization failed for libmissing.so: "),
        "{messages:?}"
    );
    assert!(messages[1].contains("PPROF_BINARY_PATH"), "{messages:?}");
    assert_eq!(sorted_comments(&profile), vec!["local=[]"]);
}

/// Check that `fastlocal` asks for function names only.
#[test]
fn symbolize_fast_local() {
    let (_diag, sink) = diagnostics();
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(sink)
        .build();

    let mut profile = test_profile();
    let () = symbolizer
        .symbolize("fastlocal", &MappingSources::new(), &mut profile)
        .unwrap();

    assert_eq!(names(&profile, 0), vec!["main"]);
    let line = profile.locations[0].lines[0];
    assert_eq!(line.line, 0);
    assert_eq!(profile.function(line.function).unwrap().filename, "");
    assert_eq!(sorted_comments(&profile), vec!["local=[fast]"]);
}

/// Check that display names are produced at the requested level.
#[cfg(feature = "demangle")]
#[test]
fn symbolize_and_demangle() {
    let name_of = |profile: &Profile, raw: &str| {
        profile
            .functions
            .iter()
            .find(|function| function.system_name == raw)
            .map(|function| function.name.clone())
            .unwrap()
    };

    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(|_msg: &str| ())
        .build();

    let mut profile = test_profile();
    let () = symbolizer
        .symbolize("local:demangle=none", &MappingSources::new(), &mut profile)
        .unwrap();
    assert_eq!(name_of(&profile, SERVER_PROCESS), "server::process");
    assert_eq!(name_of(&profile, VECTOR_PUSH_BACK), "std::vector::push_back");
    assert_eq!(name_of(&profile, "main"), "main");

    let mut profile = test_profile();
    let () = symbolizer
        .symbolize("local:demangle=templates", &MappingSources::new(), &mut profile)
        .unwrap();
    assert_eq!(name_of(&profile, SERVER_PROCESS), "server::process");
    let push_back = name_of(&profile, VECTOR_PUSH_BACK);
    assert!(push_back.starts_with("std::vector<int"), "{push_back}");
    assert!(push_back.ends_with("::push_back"), "{push_back}");

    let mut profile = test_profile();
    let () = symbolizer
        .symbolize("local:demangle=full", &MappingSources::new(), &mut profile)
        .unwrap();
    assert_eq!(name_of(&profile, SERVER_PROCESS), "server::process()");
    let push_back = name_of(&profile, VECTOR_PUSH_BACK);
    assert!(push_back.contains("push_back(int const&)"), "{push_back}");

    assert_eq!(
        sorted_comments(&profile),
        vec!["demangle=[full]", "force", "local=[force]"]
    );
}

/// Make sure that requesting demangling re-resolves locations that
/// were symbolized already.
#[test]
fn demangle_implies_force() {
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(|_msg: &str| ())
        .build();

    let mut profile = test_profile();
    let () = profile.functions.push(Function {
        id: 1,
        name: "stale".to_string(),
        system_name: "stale".to_string(),
        filename: String::new(),
    });
    profile.locations[0].lines = vec![Line {
        function: FunctionId(0),
        line: 1,
        column: 0,
    }];

    let () = symbolizer
        .symbolize("local", &MappingSources::new(), &mut profile)
        .unwrap();
    assert_eq!(names(&profile, 0), vec!["stale"]);

    let () = symbolizer
        .symbolize("local:demangle=none", &MappingSources::new(), &mut profile)
        .unwrap();
    assert_eq!(names(&profile, 0), vec!["main"]);
}

/// Check that a missing main binary file name is reported.
#[test]
fn missing_main_binary() {
    let (diag, sink) = diagnostics();
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(sink)
        .build();

    let mut profile = test_profile();
    profile.mappings[0].file = String::new();
    let () = profile.mappings.truncate(1);
    let () = profile.locations.truncate(3);
    let original = profile.clone();

    let () = symbolizer
        .symbolize("local", &MappingSources::new(), &mut profile)
        .unwrap();

    assert_eq!(profile.locations, original.locations);
    assert_eq!(diag.messages(), vec!["Main binary filename not available."]);
}

/// Check that a build ID mismatch only affects the mapping in question.
#[test]
fn build_id_mismatch() {
    let (diag, sink) = diagnostics();
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(sink)
        .build();

    let mut profile = test_profile();
    profile.mappings[0].build_id = "deadbeef".to_string();
    let () = symbolizer
        .symbolize("local", &MappingSources::new(), &mut profile)
        .unwrap();

    assert!(names(&profile, 0).is_empty());
    assert_eq!(names(&profile, 3), vec![VECTOR_PUSH_BACK]);

    let messages = diag.messages();
    assert!(
        messages.contains(
            &"Local symbolization failed for server (build ID deadbeef): build ID mismatch"
                .to_string()
        ),
        "{messages:?}"
    );
}

/// Check that local and remote symbolization complement each other.
#[test]
fn symbolize_local_and_remote() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let lookup = {
        let requests = Rc::clone(&requests);
        move |url: &str, query: &str| -> Result<Vec<u8>> {
            let () = requests
                .borrow_mut()
                .push((url.to_string(), query.to_string()));
            Ok(b"0x900100 _ZN7missing4funcEv\n".to_vec())
        }
    };

    let (diag, sink) = diagnostics();
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_lookup(lookup)
        .set_diagnostics(sink)
        .build();

    let sources = MappingSources::from([(
        MISSING.to_string(),
        vec![MappingSource {
            source: "http://server:8080/debug/pprof/profile?seconds=30".to_string(),
            start: 0x900000,
        }],
    )]);

    let mut profile = test_profile();
    let () = symbolizer
        .symbolize("", &sources, &mut profile)
        .unwrap();

    // Only locations not resolved locally are looked up.
    assert_eq!(
        *requests.borrow(),
        vec![(
            "http://server:8080/debug/pprof/symbol".to_string(),
            "0x900100+0x900200".to_string()
        )]
    );
    assert_eq!(names(&profile, 0), vec!["main"]);
    assert_eq!(names(&profile, 4), vec!["_ZN7missing4funcEv"]);
    assert!(names(&profile, 5).is_empty());

    let function = profile.function(profile.locations[4].lines[0].function).unwrap();
    assert_eq!(function.filename, "");
    assert_eq!(profile.locations[4].lines[0].line, 0);

    // The local failure is still reported.
    assert!(diag
        .messages()
        .iter()
        .any(|msg| msg.starts_with("Local symbolization failed for libmissing.so")));
    assert_eq!(sorted_comments(&profile), vec!["local=[]", "symbolz=[]"]);
}

/// Check that symbolization results are deterministic.
#[test]
fn deterministic_output() -> anyhow::Result<()> {
    let symbolizer = Symbolizer::builder()
        .set_obj_tool(obj_tool())
        .set_diagnostics(|_msg: &str| ())
        .build();

    let mut profile1 = test_profile();
    let mut profile2 = test_profile();
    for profile in [&mut profile1, &mut profile2] {
        let () = symbolizer.symbolize("local:demangle=full", &MappingSources::new(), profile)?;
    }
    assert_eq!(profile1.to_string(), profile2.to_string());
    Ok(())
}

/// Make sure that a malformed mode is rejected without touching the
/// profile.
#[test]
fn invalid_mode() {
    let symbolizer = Symbolizer::builder().set_obj_tool(obj_tool()).build();
    let mut profile = test_profile();
    let err = symbolizer
        .symbolize("local:demangle=bogus", &MappingSources::new(), &mut profile)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(profile, test_profile());

    let () = symbolizer
        .symbolize("none", &MappingSources::new(), &mut profile)
        .unwrap();
    assert_eq!(profile, test_profile());
}
