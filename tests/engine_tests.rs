//! Integration tests for scope declarations and descriptor emission.
//!
//! These drive the engine directly through [`cmk::engine::Scope`] handles
//! and inspect what reaches a [`MemorySink`].

use anyhow::{Context, Result, ensure};
use cmk::backend::BackendKind;
use cmk::config::EngineConfig;
use cmk::engine::{Engine, InstallTarget, ServerDefinition, ServerOptions};
use cmk::error::EngineError;
use cmk::ir::Statement;
use cmk::platform::PlatformFamily;
use cmk::sink::MemorySink;
use cmk::target::{TargetKind, Version};
use rstest::{fixture, rstest};

const ROOT: &str = "/p/makefile.yml";

fn engine_for(backend: BackendKind) -> Engine<MemorySink> {
    let config = EngineConfig::new("/home")
        .with_backend(backend)
        .with_platform(PlatformFamily::Linux);
    Engine::new(config, MemorySink::new())
}

#[fixture]
fn engine() -> Engine<MemorySink> {
    engine_for(BackendKind::Ninja)
}

fn descriptor<'a>(engine: &'a Engine<MemorySink>, path: &str) -> Result<&'a str> {
    engine
        .sink()
        .get(path)
        .with_context(|| format!("no descriptor written at {path}"))
}

fn subscopes(statements: &[Statement]) -> usize {
    statements
        .iter()
        .filter(|statement| matches!(statement, Statement::Subscope(_)))
        .count()
}

#[rstest]
fn repeated_compile_resolves_to_the_same_object(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let first = scope.compile("source/a.cpp", None, "-O2")?;
    let second = scope.compile("source/a.cpp", None, " -O2 ")?;
    ensure!(first == second, "{first} != {second}");
    ensure!(first == "/p/obj/source/a.o", "unexpected object {first}");
    ensure!(scope.statements().len() == 1, "identical compile recorded twice");

    let err = scope
        .compile("source/a.cpp", None, "-O0")
        .expect_err("differing compile of the same object");
    ensure!(
        matches!(err, EngineError::DuplicateTarget { kind: TargetKind::Object, .. }),
        "unexpected error {err}"
    );
    Ok(())
}

#[rstest]
fn nested_paths_resolve_against_their_description(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    root.include_paths(["../shared/include"])?;
    {
        let mut nested = root.build("sub/makefile.yml")?;
        ensure!(nested.base_dir() == "/p/sub", "base {}", nested.base_dir());
        ensure!(nested.descriptor() == "/p/sub/makefile.yml.ninja");
        let object = nested.compile("x.cpp", None, "")?;
        ensure!(object == "/p/sub/obj/x.o", "unexpected object {object}");
        let target = nested.link_executable("bin/tool", &[object], &[])?;
        ensure!(target.path() == "/p/sub/bin/tool");
        nested.finish()?;
    }
    root.finish()?;

    let nested = descriptor(&engine, "/p/sub/makefile.yml.ninja")?;
    ensure!(
        nested.contains("build /p/sub/obj/x.o: compile /p/sub/x.cpp || /p/sub/obj\n  INCLUDE_PATHS_DIRECTIVE = -I /p/sub/include\n"),
        "independent scopes start from default search paths:\n{nested}"
    );
    Ok(())
}

#[rstest]
fn library_aliases_resolve_to_the_built_file(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let common = scope.compile("common.cpp", None, "")?;
    let library = scope.link_library("bin/common", &[common], &[], None)?;
    ensure!(library.alias() == "common");
    ensure!(library.path() == "/p/bin/libcommon.so");
    let main = scope.compile("main.cpp", None, "")?;
    scope.link_executable("bin/app", &[main], &["common"])?;
    scope.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(
        ninja.contains("build /p/bin/app: linkexecutable /p/obj/main.o | /p/bin/libcommon.so || /p/bin\n"),
        "link edge should depend on the library file:\n{ninja}"
    );
    ensure!(ninja.contains("build common: phony /p/bin/libcommon.so\n"));
    ensure!(
        !ninja.contains("build common: phony\n"),
        "built libraries need no fallback"
    );
    Ok(())
}

#[rstest]
fn libraries_of_enclosing_scopes_are_visible_to_nested_ones(
    mut engine: Engine<MemorySink>,
) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    let object = root.compile("common.cpp", None, "")?;
    root.link_library("bin/common", &[object], &[], None)?;
    {
        let mut nested = root.build("app/makefile.yml")?;
        let main = nested.compile("main.cpp", None, "")?;
        nested.link_executable("bin/app", &[main], &["common"])?;
        nested.finish()?;
    }
    root.finish()?;

    let nested = descriptor(&engine, "/p/app/makefile.yml.ninja")?;
    ensure!(
        nested.contains("linkexecutable /p/app/obj/main.o | /p/bin/libcommon.so || /p/app/bin\n"),
        "nested link should see the enclosing library:\n{nested}"
    );
    Ok(())
}

#[rstest]
fn every_unbuilt_library_gets_one_fallback(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    let a = root.compile("a.cpp", None, "")?;
    root.link_executable("bin/a", &[a], &["ext", "other"])?;
    {
        let mut nested = root.build("sub/makefile.yml")?;
        let b = nested.compile("b.cpp", None, "")?;
        nested.link_executable("bin/b", &[b], &["ext"])?;
        nested.finish()?;
    }
    root.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(ninja.matches("build ext: phony\n").count() == 1, "{ninja}");
    ensure!(ninja.matches("build other: phony\n").count() == 1, "{ninja}");
    let nested = descriptor(&engine, "/p/sub/makefile.yml.ninja")?;
    ensure!(
        !nested.contains("build ext: phony"),
        "nested Ninja files must not redefine fallbacks:\n{nested}"
    );
    Ok(())
}

#[rstest]
fn finalize_runs_once_and_closes_the_scope(mut engine: Engine<MemorySink>) -> Result<()> {
    {
        let mut scope = engine.open(ROOT)?;
        scope.compile("a.cpp", None, "")?;
        scope.finalize()?;
        scope.finalize()?;
        ensure!(!scope.is_open());
        let err = scope
            .compile("b.cpp", None, "")
            .expect_err("declaration after finalize");
        ensure!(
            matches!(&err, EngineError::ScopeClosed { description } if description == ROOT),
            "unexpected error {err}"
        );
    }
    ensure!(engine.sink().writes() == 1, "descriptor written more than once");
    Ok(())
}

#[rstest]
fn dropping_a_scope_finalizes_it(mut engine: Engine<MemorySink>) -> Result<()> {
    {
        let mut scope = engine.open(ROOT)?;
        scope.compile("a.cpp", None, "")?;
    }
    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(ninja.contains("build compile: phony /p/obj/a.o\n"));
    Ok(())
}

#[rstest]
fn versioned_libraries_build_and_install_their_soname_chain(
    mut engine: Engine<MemorySink>,
) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let object = scope.compile("foo.cpp", None, "")?;
    let library = scope.link_library("bin/foo", &[object], &[], Some(Version::new(2, 3)))?;
    ensure!(library.path() == "/p/bin/libfoo.so.2.3");
    ensure!(library.link_path() == "/p/bin/libfoo.so");
    let installed = scope.install(&InstallTarget::Single("foo".to_owned()), "/opt/lib")?;
    ensure!(installed == ["/opt/lib/libfoo.so.2.3"], "{installed:?}");
    scope.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    for expected in [
        "  SONAME_DIRECTIVE = -Wl,-soname,libfoo.so.2\n",
        "build /p/bin/libfoo.so.2: symlink /p/bin/libfoo.so.2.3\n  target = libfoo.so.2.3\n",
        "build /p/bin/libfoo.so: symlink /p/bin/libfoo.so.2\n  target = libfoo.so.2\n",
        "build foo: phony /p/bin/libfoo.so\n",
        "build /opt/lib/libfoo.so.2.3: install /p/bin/libfoo.so.2.3 || /opt/lib\n  destination = /opt/lib\n",
        "build /opt/lib/libfoo.so.2: symlink /opt/lib/libfoo.so.2.3\n",
        "build /opt/lib/libfoo.so: symlink /opt/lib/libfoo.so.2\n",
        "build install: phony /opt/lib/libfoo.so.2.3\n",
    ] {
        ensure!(ninja.contains(expected), "missing {expected:?} in:\n{ninja}");
    }
    Ok(())
}

#[rstest]
fn project_with_local_and_external_libraries(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    {
        let mut common = root.build("common/makefile.yml")?;
        let object = common.compile("source/common.cpp", None, "")?;
        common.link_library("bin/common", &[object], &[], None)?;
        common.finish()?;
    }
    let main = root.compile("source/main.cpp", None, "")?;
    root.link_executable("bin/app", &[main], &["common", "ext"])?;
    root.finish()?;

    let paths: Vec<&str> = engine.sink().iter().map(|(path, _)| path.as_str()).collect();
    ensure!(
        paths == ["/p/common/makefile.yml.ninja", "/p/build.ninja"],
        "children commit before their parent: {paths:?}"
    );
    let common = descriptor(&engine, "/p/common/makefile.yml.ninja")?;
    ensure!(common.contains(concat!(
        "build /p/common/bin/libcommon.so: linklibrary /p/common/obj/source/common.o || /p/common/bin\n",
        "  LIBRARY_PATHS_DIRECTIVE = -L /p/common/bin -Wl,-rpath-link=/p/common/bin\n\n",
        "build common: phony /p/common/bin/libcommon.so\n",
    )));
    let ninja = descriptor(&engine, "/p/build.ninja")?;
    for expected in [
        "include /home/make/ninja/linux.ninja\n",
        "subninja /p/common/makefile.yml.ninja\n",
        concat!(
            "build /p/bin/app: linkexecutable /p/obj/source/main.o | /p/common/bin/libcommon.so ext || /p/bin\n",
            "  LIBRARY_PATHS_DIRECTIVE = -L /p/bin -Wl,-rpath-link=/p/bin\n",
            "  libs = -l common -l ext\n",
        ),
        "build ext: phony\n",
        "build compile: phony /p/common/obj/source/common.o /p/obj/source/main.o\n",
        "build link: phony /p/common/bin/libcommon.so /p/bin/app\n",
        "build all: phony compile link\n\ndefault all\n",
    ] {
        ensure!(ninja.contains(expected), "missing {expected:?} in:\n{ninja}");
    }
    ensure!(!ninja.contains("build common: phony"), "{ninja}");
    Ok(())
}

#[rstest]
fn reusing_a_closed_scope_yields_a_closed_handle(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    root.build("sub/makefile.yml")?.finish()?;
    {
        let mut again = root.build("sub/makefile.yml")?;
        ensure!(!again.is_open(), "second build should reuse the closed scope");
        let err = again
            .compile("x.cpp", None, "")
            .expect_err("declaration on a reused scope");
        ensure!(matches!(err, EngineError::ScopeClosed { .. }), "{err}");
    }
    ensure!(
        subscopes(root.statements()) == 1,
        "Ninja includes each nested descriptor once"
    );
    root.finish()?;
    ensure!(engine.sink().len() == 2);
    Ok(())
}

#[rstest]
fn building_an_open_description_is_recursive(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    let mut nested = root.build("sub/makefile.yml")?;
    let err = nested
        .build("../makefile.yml")
        .err()
        .context("re-entering the root description should fail")?;
    match err {
        EngineError::RecursiveBuild { chain } => ensure!(
            chain == ["/p/makefile.yml", "/p/sub/makefile.yml", "/p/makefile.yml"],
            "unexpected chain {chain:?}"
        ),
        other => anyhow::bail!("unexpected error {other}"),
    }
    Ok(())
}

#[rstest]
#[case(TargetKind::Archive)]
#[case(TargetKind::Executable)]
fn redeclaring_a_name_is_rejected(
    mut engine: Engine<MemorySink>,
    #[case] second: TargetKind,
) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let object = scope.compile("a.cpp", None, "")?;
    scope.link_executable("bin/app", &[object.clone()], &[])?;
    let err = match second {
        TargetKind::Archive => scope.link_archive("bin/app", &[object]),
        _ => scope.link_executable("bin/app", &[object], &[]),
    }
    .expect_err("second declaration");
    match (second, &err) {
        (TargetKind::Archive, EngineError::ConflictingTarget { existing, requested, .. }) => {
            ensure!(*existing == TargetKind::Executable && *requested == TargetKind::Archive);
        }
        (TargetKind::Executable, EngineError::DuplicateTarget { name, .. }) => {
            ensure!(name == "bin/app");
        }
        _ => anyhow::bail!("unexpected error {err}"),
    }
    Ok(())
}

#[rstest]
#[case(BackendKind::Ninja, true)]
#[case(BackendKind::Make, false)]
fn outputs_are_unique_per_namespace(#[case] backend: BackendKind, #[case] rejected: bool) -> Result<()> {
    let mut engine = engine_for(backend);
    let mut root = engine.open(ROOT)?;
    root.compile("a.cpp", Some("/p/out/shared.o"), "")?;
    let mut nested = root.build("sub/makefile.yml")?;
    let result = nested.compile("b.cpp", Some("/p/out/shared.o"), "");
    ensure!(result.is_err() == rejected, "{backend}: {result:?}");
    if let Err(err) = result {
        ensure!(
            matches!(&err, EngineError::DuplicateOutput { path } if path == "/p/out/shared.o"),
            "{err}"
        );
    }
    Ok(())
}

#[rstest]
#[case(BackendKind::Ninja, true)]
#[case(BackendKind::Make, false)]
fn library_names_cannot_shadow_aggregates(
    #[case] backend: BackendKind,
    #[case] rejected: bool,
) -> Result<()> {
    let mut engine = engine_for(backend);
    let mut root = engine.open(ROOT)?;
    let object = root.compile("link.cpp", None, "")?;
    let result = root.link_library("bin/link", &[object], &[], None);
    ensure!(result.is_err() == rejected, "{backend}: {result:?}");
    if let Err(err) = result {
        ensure!(
            matches!(&err, EngineError::DuplicateOutput { path } if path == "link"),
            "{err}"
        );
    }

    let mut nested = root.build("sub/makefile.yml")?;
    let object = nested.compile("app.cpp", None, "")?;
    let result = nested.link_executable("bin/app", &[object], &["install"]);
    ensure!(result.is_err() == rejected, "{backend}: {result:?}");
    if let Err(err) = result {
        ensure!(
            matches!(&err, EngineError::DuplicateOutput { path } if path == "install"),
            "{err}"
        );
    }
    Ok(())
}

#[rstest]
#[case(BackendKind::Ninja, "build /p/obj/src/shared/a.o: compile /src/shared/a.cpp || /p/obj/src/shared\n")]
#[case(BackendKind::Make, "\t-rm -f /p/obj/src/shared/*.o\n")]
fn absolute_sources_compile_below_the_object_directory(
    #[case] backend: BackendKind,
    #[case] expected: &str,
) -> Result<()> {
    let mut engine = engine_for(backend);
    let mut scope = engine.open(ROOT)?;
    let object = scope.compile("/src/shared/a.cpp", None, "")?;
    ensure!(object == "/p/obj/src/shared/a.o", "{backend}: {object}");
    let clean: Vec<&str> = scope
        .ledger()
        .clean_paths()
        .iter()
        .map(|path| path.as_str())
        .collect();
    ensure!(clean == ["/p/obj/src/shared"], "{backend}: {clean:?}");
    let descriptor_path = scope.descriptor().to_path_buf();
    scope.finish()?;

    let text = descriptor(&engine, descriptor_path.as_str())?;
    ensure!(text.contains(expected), "{backend}: missing {expected:?} in:\n{text}");
    ensure!(
        !text.contains(" /src/shared/a.o") && !text.contains("\n/src/shared/a.o"),
        "{backend}: object escaped the object directory:\n{text}"
    );
    Ok(())
}

#[rstest]
#[case(BackendKind::Ninja, concat!(
    "build deploy_target_bin_app: deploy /p/bin/app\n",
    "  directive = production\n",
))]
#[case(BackendKind::Make, concat!(
    "deploy: deploy_target_bin_app\n\n",
    "deploy_target_bin_app: /p/bin/app\n",
    "\t-@make.deploy.ksh /p/bin/app production\n",
))]
fn deployments_hand_linked_targets_to_the_deploy_script(
    #[case] backend: BackendKind,
    #[case] expected: &str,
) -> Result<()> {
    let mut engine = engine_for(backend);
    let mut scope = engine.open(ROOT)?;
    let main = scope.compile("main.cpp", None, "")?;
    scope.link_executable("bin/app", &[main.clone()], &[])?;
    scope.deploy("app", " production ")?;

    let err = scope.deploy("bin/app", "again").expect_err("second deploy");
    ensure!(
        matches!(&err, EngineError::DuplicateOutput { path } if path == "deploy_target_bin_app"),
        "{backend}: {err}"
    );
    for name in [main.as_str(), "bin/missing"] {
        let err = scope.deploy(name, "").expect_err("not a linked target");
        ensure!(
            matches!(&err, EngineError::UnknownTarget { name: unknown, .. } if unknown == name),
            "{backend}: {err}"
        );
    }
    let goals: Vec<&str> = scope
        .ledger()
        .deploy_goals()
        .iter()
        .map(String::as_str)
        .collect();
    ensure!(goals == ["deploy_target_bin_app"], "{backend}: {goals:?}");
    let descriptor_path = scope.descriptor().to_path_buf();
    scope.finish()?;

    let text = descriptor(&engine, descriptor_path.as_str())?;
    ensure!(text.contains(expected), "{backend}: missing {expected:?} in:\n{text}");
    if backend == BackendKind::Ninja {
        ensure!(text.contains("build deploy: phony deploy_target_bin_app\n"), "{text}");
    }
    Ok(())
}

#[rstest]
fn deploy_goal_is_reserved_under_ninja(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let main = scope.compile("main.cpp", None, "")?;
    let err = scope
        .link_executable("bin/app", &[main], &["deploy"])
        .expect_err("library named after an aggregate");
    ensure!(
        matches!(&err, EngineError::DuplicateOutput { path } if path == "deploy"),
        "{err}"
    );
    Ok(())
}

#[rstest]
fn dependencies_become_order_only_prerequisites(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let app = scope.compile("app.cpp", None, "")?;
    let tool = scope.compile("tool.cpp", None, "")?;
    scope.link_executable("bin/app", &[app], &[])?;
    scope.link_executable("bin/tool", &[tool], &[])?;
    scope.dependencies("bin/app", &["tool"])?;

    let err = scope
        .dependencies("bin/missing", &[])
        .expect_err("unknown target");
    ensure!(matches!(&err, EngineError::UnknownTarget { name, .. } if name == "bin/missing"));
    let err = scope
        .dependencies("bin/app", &["nowhere"])
        .expect_err("unknown prerequisite");
    ensure!(matches!(&err, EngineError::UnknownTarget { name, .. } if name == "nowhere"));
    scope.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(
        ninja.contains("build /p/bin/app: linkexecutable /p/obj/app.o || /p/bin /p/bin/tool\n"),
        "{ninja}"
    );
    Ok(())
}

#[rstest]
fn circular_dependencies_abort_the_evaluation(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let a = scope.compile("a.cpp", None, "")?;
    let b = scope.compile("b.cpp", None, "")?;
    scope.link_executable("bin/a", &[a], &[])?;
    scope.link_executable("bin/b", &[b], &[])?;
    scope.dependencies("bin/a", &["bin/b"])?;
    scope.dependencies("bin/b", &["bin/a"])?;
    let err = scope.finish().expect_err("cycle");
    match err {
        EngineError::CircularDependency { cycle } => {
            ensure!(cycle.first() == cycle.last(), "cycle should be closed: {cycle:?}");
            ensure!(cycle.iter().any(|node| node == "/p/bin/a"));
            ensure!(cycle.iter().any(|node| node == "/p/bin/b"));
        }
        other => anyhow::bail!("unexpected error {other}"),
    }
    ensure!(engine.sink().is_empty(), "nothing is written after a failure");
    Ok(())
}

#[rstest]
fn abandoning_a_nested_scope_discards_everything(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    root.build("done/makefile.yml")?.finish()?;
    let mut broken = root.build("broken/makefile.yml")?;
    broken.compile("a.cpp", None, "")?;
    broken.abandon();
    let err = root.finish().expect_err("abandoned evaluation");
    ensure!(
        matches!(err, EngineError::EvaluationFailed { source: None }),
        "unexpected error {err}"
    );
    ensure!(engine.sink().is_empty(), "abandoned evaluations write nothing");
    Ok(())
}

#[rstest]
#[case(BackendKind::Ninja)]
#[case(BackendKind::Make)]
fn nested_scopes_failing_on_drop_fail_the_evaluation(#[case] backend: BackendKind) -> Result<()> {
    let mut engine = engine_for(backend);
    let mut root = engine.open(ROOT)?;
    root.compile("main.cpp", None, "")?;
    {
        let mut nested = root.build("sub/makefile.yml")?;
        let a = nested.compile("a.cpp", None, "")?;
        let b = nested.compile("b.cpp", None, "")?;
        nested.link_executable("bin/a", &[a], &[])?;
        nested.link_executable("bin/b", &[b], &[])?;
        nested.dependencies("bin/a", &["bin/b"])?;
        nested.dependencies("bin/b", &["bin/a"])?;
    }
    let err = root.finish().expect_err("nested scope failed while dropped");
    match &err {
        EngineError::EvaluationFailed { source: Some(cause) } => ensure!(
            matches!(**cause, EngineError::CircularDependency { .. }),
            "{backend}: unexpected cause {cause}"
        ),
        other => anyhow::bail!("{backend}: unexpected error {other}"),
    }
    ensure!(engine.sink().is_empty(), "{backend}: nothing is written after a failure");
    Ok(())
}

#[rstest]
fn inherit_scopes_carry_search_paths_and_prologue(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    root.include_paths(["../shared/include"])?;
    root.add_pre_build_statement("cflags = -g")?;
    {
        let mut tests = root.inherit("unittest")?;
        ensure!(tests.descriptor() == "/p/makefile.yml.unittest.ninja");
        tests.compile("test.cpp", None, "")?;
        {
            let mut inner = tests.inherit("deep")?;
            ensure!(inner.descriptor() == "/p/makefile.yml.unittest_deep.ninja");
            inner.finish()?;
        }
        tests.finish()?;
    }
    root.finish()?;

    let tests = descriptor(&engine, "/p/makefile.yml.unittest.ninja")?;
    ensure!(tests.starts_with("cflags = -g\n\n"), "{tests}");
    ensure!(
        tests.contains("  INCLUDE_PATHS_DIRECTIVE = -I /p/include -I /shared/include\n"),
        "{tests}"
    );
    let root = descriptor(&engine, "/p/build.ninja")?;
    ensure!(root.contains("subninja /p/makefile.yml.unittest.ninja\n"));
    Ok(())
}

#[rstest]
fn unit_tests_link_the_framework(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let object = scope.compile("test.cpp", None, "")?;
    scope.link_unittest("bin/unittest", &[object], &["common"])?;
    scope.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    for expected in [
        "  LIBRARY_PATHS_DIRECTIVE = -L /p/bin -Wl,-rpath-link=/p/bin -L /home/thirdparty/unittest/gtest/bin -Wl,-rpath-link=/home/thirdparty/unittest/gtest/bin\n",
        "  libs = -l common -l gtest -l gtest_main\n",
        "build gtest: phony\n",
        "build test: phony /p/bin/unittest\n",
        "build link: phony /p/bin/unittest\n",
    ] {
        ensure!(ninja.contains(expected), "missing {expected:?} in:\n{ninja}");
    }
    Ok(())
}

#[rstest]
fn servers_carry_their_service_directives(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let object = scope.compile("server.cpp", None, "")?;
    let options = ServerOptions {
        definition: ServerDefinition::Services(vec!["a".to_owned(), "b".to_owned()]),
        resources: vec!["db".to_owned()],
        configuration: Some("conf/resources.yml".into()),
    };
    let server = scope.link_server("bin/server", &[object], &[], &options)?;
    ensure!(server.kind() == TargetKind::Server);
    scope.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(
        ninja.contains(concat!(
            "build /p/bin/server: linkserver /p/obj/server.o || /p/bin\n",
            "  LIBRARY_PATHS_DIRECTIVE = -L /p/bin -Wl,-rpath-link=/p/bin\n",
            "  INCLUDE_PATHS_DIRECTIVE = -I /p/include\n",
            "  directives = --resource-keys db --properties-file /p/conf/resources.yml -s a b\n",
        )),
        "{ninja}"
    );
    Ok(())
}

#[rstest]
fn installs_files_and_relocated_targets(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut scope = engine.open(ROOT)?;
    let object = scope.compile("app.cpp", None, "")?;
    scope.link_executable("bin/app", &[object], &[])?;
    let targets = InstallTarget::Many(vec![
        InstallTarget::Single("bin/app".to_owned()),
        InstallTarget::Relocated {
            target: "conf/app.yml".to_owned(),
            subdirectory: "etc".to_owned(),
        },
    ]);
    let installed = scope.install(&targets, "/opt")?;
    ensure!(installed == ["/opt/app", "/opt/etc/app.yml"], "{installed:?}");
    let err = scope
        .install(&InstallTarget::Single("app".to_owned()), "/opt")
        .expect_err("installing the same file twice");
    ensure!(matches!(err, EngineError::DuplicateOutput { .. }), "{err}");
    scope.finish()?;

    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(ninja.contains("build /opt/etc/app.yml: install /p/conf/app.yml || /opt/etc\n"));
    ensure!(ninja.contains("build install: phony /opt/app /opt/etc/app.yml\n"));
    Ok(())
}

#[rstest]
fn sequential_scopes_serialise_the_whole_graph(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open(ROOT)?;
    {
        let mut nested = root.build("sub/makefile.yml")?;
        nested.set_parallel(false)?;
        nested.set_parallel(true)?;
        nested.compile("a.cpp", None, "")?;
        nested.finish()?;
    }
    root.compile("b.cpp", None, "")?;
    root.finish()?;

    let nested = descriptor(&engine, "/p/sub/makefile.yml.ninja")?;
    ensure!(nested.contains("  pool = sequential\n"), "first choice sticks:\n{nested}");
    let ninja = descriptor(&engine, "/p/build.ninja")?;
    ensure!(ninja.contains("pool sequential\n  depth = 1\n"), "{ninja}");
    ensure!(
        ninja.contains("build /p/obj/b.o: compile /p/b.cpp || /p/obj\n  INCLUDE_PATHS_DIRECTIVE = -I /p/include\n\n"),
        "parallel scopes keep their edges out of the pool:\n{ninja}"
    );
    Ok(())
}
