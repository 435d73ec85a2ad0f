//! Integration tests for the GNU Make backend.
//!
//! Makefiles stand alone and are run recursively, so each one carries its
//! own aggregates and fallbacks and references every nested makefile it
//! needs, even ones generated earlier by a sibling.

use anyhow::{Context, Result, ensure};
use cmk::backend::BackendKind;
use cmk::config::EngineConfig;
use cmk::engine::Engine;
use cmk::ir::{Nesting, Statement};
use cmk::platform::PlatformFamily;
use cmk::sink::MemorySink;
use rstest::{fixture, rstest};

#[fixture]
fn engine() -> Engine<MemorySink> {
    let config = EngineConfig::new("/home")
        .with_backend(BackendKind::Make)
        .with_platform(PlatformFamily::Linux)
        .with_generator("/usr/bin/cmk");
    Engine::new(config, MemorySink::new())
}

fn makefile<'a>(engine: &'a Engine<MemorySink>, path: &str) -> Result<&'a str> {
    engine
        .sink()
        .get(path)
        .with_context(|| format!("no makefile written at {path}"))
}

#[rstest]
fn shared_nested_descriptions_are_referenced_by_every_user(
    mut engine: Engine<MemorySink>,
) -> Result<()> {
    let mut root = engine.open("/p/makefile.yml")?;
    {
        let mut a = root.build("a/makefile.yml")?;
        a.build("../common/makefile.yml")?.finish()?;
        a.finish()?;
    }
    {
        let mut b = root.build("b/makefile.yml")?;
        {
            let reused = b.build("../common/makefile.yml")?;
            ensure!(!reused.is_open(), "common was evaluated by a already");
        }
        let references: Vec<_> = b
            .statements()
            .iter()
            .filter_map(|statement| match statement {
                Statement::Subscope(reference) => Some(reference.clone()),
                _ => None,
            })
            .collect();
        ensure!(references.len() == 1, "{references:?}");
        ensure!(references.iter().all(|r| r.nesting == Nesting::Independent));
        b.finish()?;
    }
    root.finish()?;

    ensure!(engine.sink().len() == 4, "one makefile per description");
    let b = makefile(&engine, "/p/b/makefile.yml.mk")?;
    ensure!(
        b.contains("build_p_common_makefile.yml.mk: /p/common/makefile.yml.mk\n"),
        "{b}"
    );
    Ok(())
}

#[rstest]
fn nested_makefiles_regenerate_through_the_generator(
    mut engine: Engine<MemorySink>,
) -> Result<()> {
    let mut root = engine.open("/p/makefile.yml")?;
    root.build("a/makefile.yml")?.finish()?;
    root.finish()?;

    let text = makefile(&engine, "/p/makefile.yml.mk")?;
    for expected in [
        "/p/a/makefile.yml.mk: /p/a/makefile.yml\n",
        "\t@cd /p/a && /usr/bin/cmk --backend make --platform linux -f /p/a/makefile.yml generate\n",
        "\t@$(MAKE) -C \"/p/a\" $(MAKECMDGOALS) -f /p/a/makefile.yml.mk\n",
        "nested_build_targets = build_p_a_makefile.yml.mk\n",
        "nested_make_targets = make_p_a_makefile.yml.mk\n",
    ] {
        ensure!(text.contains(expected), "missing {expected:?} in:\n{text}");
    }
    Ok(())
}

#[rstest]
fn libraries_of_other_makefiles_fall_back_to_file_names(
    mut engine: Engine<MemorySink>,
) -> Result<()> {
    let mut root = engine.open("/p/makefile.yml")?;
    {
        let mut common = root.build("common/makefile.yml")?;
        let object = common.compile("common.cpp", None, "")?;
        common.link_library("bin/common", &[object], &[], None)?;
        common.finish()?;
    }
    let main = root.compile("main.cpp", None, "-O2")?;
    root.link_executable("bin/app", &[main], &["common"])?;
    root.finish()?;

    let text = makefile(&engine, "/p/makefile.yml.mk")?;
    for expected in [
        "include /home/make/platform/common.mk\ninclude /home/make/platform/linux/static.mk\n",
        "\t$(COMPILER) $(COMPILE_DIRECTIVES) -O2 -I /p/include -MMD -MF /p/obj/main.d -o /p/obj/main.o -c /p/main.cpp\n",
        "dependency_target_bin_app = libcommon.so \\\n   libcommon.a\n",
        ".INTERMEDIATE: libcommon.so\n.INTERMEDIATE: libcommon.a\n",
        "libcommon.so:\nlibcommon.a:\n",
        "\t-rm -f /p/bin/app\n",
    ] {
        ensure!(text.contains(expected), "missing {expected:?} in:\n{text}");
    }
    let common = makefile(&engine, "/p/common/makefile.yml.mk")?;
    ensure!(
        !common.contains(".INTERMEDIATE"),
        "the library's own makefile builds it:\n{common}"
    );
    Ok(())
}

#[rstest]
fn inherit_scopes_run_from_the_parent_makefile(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open("/p/makefile.yml")?;
    {
        let mut tests = root.inherit("unittest")?;
        let object = tests.compile("test.cpp", None, "")?;
        tests.link_unittest("bin/unittest", &[object], &[])?;
        tests.finish()?;
    }
    root.set_parallel(false)?;
    root.finish()?;

    let root_text = makefile(&engine, "/p/makefile.yml.mk")?;
    ensure!(
        root_text.contains(concat!(
            "build_p_makefile.yml.unittest.mk:\n",
            "\t@$(MAKE) $(MAKECMDGOALS) -f /p/makefile.yml.unittest.mk\n",
        )),
        "{root_text}"
    );
    ensure!(root_text.contains("ifndef FORCE_PARALLEL\n.NOTPARALLEL:\nendif\n"));
    let tests = makefile(&engine, "/p/makefile.yml.unittest.mk")?;
    ensure!(tests.contains("test: target_bin_unittest\n"), "{tests}");
    ensure!(tests.contains("libs_target_bin_unittest = -l gtest -l gtest_main\n"));
    ensure!(
        tests.contains(
            "LOCAL_LD_LIBRARY_PATH = /p/bin:/home/thirdparty/unittest/gtest/bin:$(PLATFORMLIB_DIR)\n"
        ),
        "{tests}"
    );
    ensure!(!root_text.contains("LOCAL_LD_LIBRARY_PATH"), "{root_text}");
    Ok(())
}

#[rstest]
fn deploy_and_cross_goals_reach_nested_makefiles(mut engine: Engine<MemorySink>) -> Result<()> {
    let mut root = engine.open("/p/makefile.yml")?;
    {
        let mut sub = root.build("sub/makefile.yml")?;
        let object = sub.compile("tool.cpp", None, "")?;
        sub.link_executable("bin/tool", &[object], &[])?;
        sub.deploy("tool", "")?;
        sub.finish()?;
    }
    root.finish()?;

    let root_text = makefile(&engine, "/p/makefile.yml.mk")?;
    for expected in [
        ".PHONY: make clean link clean_exe clean_object clean_dependency compile install test deploy cross\n",
        "deploy:\ncross:\n",
        "deploy: $(nested_build_targets)\ncross: $(nested_build_targets)\n",
    ] {
        ensure!(root_text.contains(expected), "missing {expected:?} in:\n{root_text}");
    }
    let sub = makefile(&engine, "/p/sub/makefile.yml.mk")?;
    ensure!(
        sub.contains(concat!(
            "deploy: deploy_target_bin_tool\n\n",
            "deploy_target_bin_tool: /p/sub/bin/tool\n",
            "\t-@make.deploy.ksh /p/sub/bin/tool\n",
        )),
        "{sub}"
    );
    Ok(())
}
