//! Ninja descriptor generator.
//!
//! Ninja descriptors of one evaluation form a single graph: nested scopes are
//! pulled in with `subninja`, so every output, alias and aggregate may be
//! defined once only. The root scope therefore owns the includes, the
//! engine's own rules, the fallback targets, directory creation and the
//! `compile`, `link`, `test`, `install` and `all` aggregates.

use std::fmt::{self, Display, Formatter};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;

use super::{
    Backend, BackendKind, DEPLOY_SCRIPT, FrameView, NINJA_PRIMARY_FILE, library_flags,
    sibling_descriptor,
};
use crate::ir::{CompileStep, InstallStep, LinkStep, Nesting, Statement};
use crate::ledger::BuildState;
use crate::platform::Platform;
use crate::target::{SonameChain, TargetKind};

/// Pool serialising the edges of scopes that asked for sequential builds.
pub const SEQUENTIAL_POOL: &str = "sequential";

macro_rules! write_kv {
    ($f:expr, $key:expr, $val:expr) => {
        if !$val.is_empty() {
            writeln!($f, "  {} = {}", $key, $val)?;
        }
    };
}

/// Aggregate targets defined by the primary Ninja file.
const AGGREGATE_TARGETS: [&str; 6] = ["compile", "link", "test", "install", "deploy", "all"];

/// The graph backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ninja;

impl Ninja {
    /// Shared compile and link rules shipped under the build home.
    #[must_use]
    pub fn rules_file(build_home: &Utf8Path) -> Utf8PathBuf {
        build_home.join("make").join("ninja").join("rules.ninja")
    }
}

impl Backend for Ninja {
    fn kind(&self) -> BackendKind {
        BackendKind::Ninja
    }

    fn shares_namespace(&self) -> bool {
        true
    }

    fn descriptor_path(
        &self,
        description: &Utf8Path,
        nesting: Nesting,
        name: Option<&str>,
        primary: bool,
    ) -> Utf8PathBuf {
        match nesting {
            Nesting::Root if primary => description
                .parent()
                .map_or_else(|| NINJA_PRIMARY_FILE.into(), |dir| dir.join(NINJA_PRIMARY_FILE)),
            Nesting::Inherit => sibling_descriptor(description, name, "ninja"),
            Nesting::Root | Nesting::Independent => sibling_descriptor(description, None, "ninja"),
        }
    }

    fn render(&self, frame: &FrameView<'_>) -> String {
        NinjaFile { view: frame }.to_string()
    }

    fn reserved_targets(&self) -> &'static [&'static str] {
        &AGGREGATE_TARGETS
    }
}

/// Escape a path for use in a `build` line.
fn escape(path: &str) -> String {
    path.replace('$', "$$").replace(' ', "$ ").replace(':', "$:")
}

fn join<I, P>(paths: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| escape(p.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One `build` statement.
#[derive(Debug, Default)]
struct Edge {
    outputs: Vec<String>,
    rule: &'static str,
    inputs: Vec<String>,
    implicit: Vec<String>,
    order_only: Vec<String>,
    variables: Vec<(&'static str, String)>,
    pool: Option<&'static str>,
}

impl Edge {
    fn new(output: impl Into<String>, rule: &'static str) -> Self {
        Self {
            outputs: vec![output.into()],
            rule,
            ..Self::default()
        }
    }

    fn inputs<I, P>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    fn implicit<I, P>(mut self, implicit: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.implicit.extend(implicit.into_iter().map(Into::into));
        self
    }

    fn order_only<I, P>(mut self, order_only: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.order_only.extend(order_only.into_iter().map(Into::into));
        self
    }

    fn variable(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.variables.push((key, value.into()));
        self
    }

    const fn pool(mut self, pool: Option<&'static str>) -> Self {
        self.pool = pool;
        self
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "build {}: {}", join(&self.outputs), self.rule)?;
        if !self.inputs.is_empty() {
            write!(f, " {}", join(&self.inputs))?;
        }
        if !self.implicit.is_empty() {
            write!(f, " | {}", join(&self.implicit))?;
        }
        if !self.order_only.is_empty() {
            write!(f, " || {}", join(&self.order_only))?;
        }
        writeln!(f)?;
        for (key, value) in &self.variables {
            write_kv!(f, key, value);
        }
        if let Some(pool) = self.pool {
            writeln!(f, "  pool = {pool}")?;
        }
        writeln!(f)
    }
}

/// Rules the engine itself relies on, built from platform shell commands.
struct EngineRules<'a> {
    platform: &'a dyn Platform,
}

impl Display for EngineRules<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let p = self.platform;
        writeln!(f, "rule symlink")?;
        writeln!(
            f,
            "  command = {} && {}",
            p.remove("$out"),
            p.symlink("$target", "$out")
        )?;
        writeln!(f, "  description = SYMLINK $out")?;
        writeln!(f)?;
        writeln!(f, "rule mkdir")?;
        writeln!(f, "  command = {}", p.make_directory("$out"))?;
        writeln!(f, "  description = MKDIR $out")?;
        writeln!(f)?;
        writeln!(f, "rule install")?;
        writeln!(f, "  command = {}", p.install("$in", "$destination"))?;
        writeln!(f, "  description = INSTALL $in")?;
        writeln!(f)?;
        writeln!(f, "rule deploy")?;
        writeln!(f, "  command = {DEPLOY_SCRIPT} $in $directive")?;
        writeln!(f, "  description = DEPLOY $in")?;
        writeln!(f)
    }
}

/// Fallbacks, directory creation and aggregates of the whole tree.
struct Aggregates<'a> {
    ledger: &'a BuildState,
}

impl Display for Aggregates<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ledger = self.ledger;
        for library in ledger.fallback_libraries() {
            write!(f, "{}", Edge::new(library, "phony"))?;
        }
        for directory in ledger.paths_to_create() {
            write!(f, "{}", Edge::new(directory.as_str(), "mkdir"))?;
        }
        let phony = |name: &str, inputs: &IndexSet<Utf8PathBuf>| {
            Edge::new(name, "phony").inputs(
                inputs
                    .iter()
                    .map(Utf8PathBuf::as_path)
                    .map(Utf8Path::as_str),
            )
        };
        write!(f, "{}", phony("compile", ledger.compile_outputs()))?;
        write!(f, "{}", phony("link", ledger.link_outputs()))?;
        write!(f, "{}", phony("test", ledger.test_outputs()))?;
        write!(f, "{}", phony("install", ledger.install_outputs()))?;
        write!(
            f,
            "{}",
            Edge::new("deploy", "phony").inputs(ledger.deploy_goals().iter().map(String::as_str))
        )?;
        write!(f, "{}", Edge::new("all", "phony").inputs(["compile", "link"]))?;
        writeln!(f, "default all")
    }
}

struct NinjaFile<'a, 'v> {
    view: &'a FrameView<'v>,
}

impl NinjaFile<'_, '_> {
    fn pool(&self) -> Option<&'static str> {
        (!self.view.ledger.parallel()).then_some(SEQUENTIAL_POOL)
    }

    fn parent_dir(path: &Utf8Path) -> Vec<String> {
        path.parent()
            .filter(|dir| !dir.as_str().is_empty())
            .map(|dir| dir.as_str().to_owned())
            .into_iter()
            .collect()
    }

    fn compile(&self, step: &CompileStep) -> Edge {
        Edge::new(step.object.as_str(), "compile")
            .inputs([step.source.as_str()])
            .order_only(Self::parent_dir(&step.object))
            .variable("INCLUDE_PATHS_DIRECTIVE", step.include_directive.as_str())
            .variable("directive", step.directive.as_str())
            .pool(self.pool())
    }

    fn link(&self, step: &LinkStep) -> Vec<Edge> {
        let target = &step.target;
        let rule = match target.kind() {
            TargetKind::SharedLibrary => "linklibrary",
            TargetKind::Archive => "archive",
            TargetKind::Server => "linkserver",
            _ => "linkexecutable",
        };
        let libraries: IndexSet<String> = step
            .libraries
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| {
                self.view
                    .resolve_library(name)
                    .map_or_else(|| name.clone(), Utf8PathBuf::into_string)
            })
            .collect();
        let mut order_only = Self::parent_dir(target.path());
        if let Some(extra) = self.view.order_only.get(target.path()) {
            order_only.extend(extra.iter().map(|p| p.as_str().to_owned()));
        }
        let mut edge = Edge::new(target.path().as_str(), rule)
            .inputs(
                step.objects
                    .iter()
                    .map(Utf8PathBuf::as_path)
                    .map(Utf8Path::as_str),
            )
            .implicit(libraries)
            .order_only(order_only);
        if target.kind() != TargetKind::Archive {
            edge = edge
                .variable("LIBRARY_PATHS_DIRECTIVE", step.library_directive.as_str())
                .variable("libs", library_flags(&step.libraries));
        }
        if let Some(include) = &step.include_directive {
            edge = edge.variable("INCLUDE_PATHS_DIRECTIVE", include.as_str());
        }
        if let Some(directives) = &step.server_directive {
            edge = edge.variable("directives", directives.as_str());
        }
        if let Some(soname) = &step.soname_directive {
            edge = edge.variable("SONAME_DIRECTIVE", soname.as_str());
        }
        let mut edges = vec![edge.pool(self.pool())];
        if let Some(chain) = step.soname_chain() {
            edges.extend(self.symlinks(&chain));
        }
        edges
    }

    fn symlinks(&self, chain: &SonameChain) -> Vec<Edge> {
        chain
            .links()
            .into_iter()
            .map(|link| {
                Edge::new(link.link.as_str(), "symlink")
                    .inputs([link.target.as_str()])
                    .variable("target", link.relative_target())
                    .pool(self.pool())
            })
            .collect()
    }

    fn install(&self, step: &InstallStep) -> Vec<Edge> {
        let mut edges = vec![
            Edge::new(step.installed.as_str(), "install")
                .inputs([step.source.as_str()])
                .order_only([step.destination.as_str()])
                .variable("destination", step.destination.as_str())
                .pool(self.pool()),
        ];
        if let Some(chain) = &step.soname {
            edges.extend(self.symlinks(chain));
        }
        edges
    }
}

impl Display for NinjaFile<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let view = self.view;
        let owner = view.nesting == Nesting::Root;
        if owner {
            let home = &view.config.build_home;
            writeln!(f, "include {}", view.platform.ninja_platform_file(home))?;
            writeln!(f)?;
            writeln!(f, "include {}", Ninja::rules_file(home))?;
            writeln!(f)?;
            write!(f, "{}", EngineRules { platform: view.platform })?;
            if view.sequential {
                writeln!(f, "pool {SEQUENTIAL_POOL}")?;
                writeln!(f, "  depth = 1")?;
                writeln!(f)?;
            }
        }
        let pre_build = view.ledger.pre_build_statements();
        for statement in pre_build {
            writeln!(f, "{statement}")?;
        }
        if !pre_build.is_empty() {
            writeln!(f)?;
        }
        for statement in view.statements {
            match statement {
                Statement::Compile(step) => write!(f, "{}", self.compile(step))?,
                Statement::Link(step) => {
                    for edge in self.link(step) {
                        write!(f, "{edge}")?;
                    }
                }
                Statement::Alias { alias, target } => write!(
                    f,
                    "{}",
                    Edge::new(alias.as_str(), "phony").inputs([target.link_path().into_string()])
                )?,
                Statement::Install(step) => {
                    for edge in self.install(step) {
                        write!(f, "{edge}")?;
                    }
                }
                Statement::Deploy(step) => write!(
                    f,
                    "{}",
                    Edge::new(step.goal(), "deploy")
                        .inputs([step.target.path().as_str()])
                        .variable("directive", step.directive.as_str())
                )?,
                Statement::Subscope(reference) => {
                    writeln!(f, "subninja {}", escape(reference.descriptor.as_str()))?;
                    writeln!(f)?;
                }
            }
        }
        if owner {
            write!(f, "{}", Aggregates { ledger: view.ledger })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ir::{OrderOnly, ScopeReference};
    use crate::platform::Linux;
    use crate::target::{Target, Version};
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> EngineConfig {
        EngineConfig::new("/home")
    }

    fn view<'a>(
        config: &'a EngineConfig,
        ledger: &'a BuildState,
        statements: &'a [Statement],
        order_only: &'a OrderOnly,
        nesting: Nesting,
    ) -> FrameView<'a> {
        FrameView {
            description: Utf8Path::new("/p/makefile.yml"),
            base_dir: Utf8Path::new("/p"),
            nesting,
            primary: nesting == Nesting::Root,
            ledger,
            ancestors: &[],
            statements,
            order_only,
            platform: &Linux,
            config,
            sequential: false,
        }
    }

    #[rstest]
    fn primary_emits_includes_rules_and_aggregates(config: EngineConfig) {
        let mut ledger = BuildState::new();
        ledger.register_compile("/p/obj/a.o");
        ledger.register_path_for_creation("/p/obj");
        ledger.register_link("/p/bin/app");
        ledger.register_phony_dependency("ext");
        let statements = vec![
            Statement::Compile(CompileStep {
                source: "/p/a.cpp".into(),
                object: "/p/obj/a.o".into(),
                include_directive: "-I /p/include".into(),
                directive: String::new(),
            }),
            Statement::Link(LinkStep {
                target: Target::new("bin/app", TargetKind::Executable, "/p/bin/app".into(), None),
                objects: vec!["/p/obj/a.o".into()],
                libraries: vec!["ext".into()],
                library_directive: "-L /p/bin".into(),
                library_paths: vec!["/p/bin".into()],
                include_directive: None,
                server_directive: None,
                soname_directive: None,
            }),
        ];
        let order_only = OrderOnly::new();
        let text = Ninja.render(&view(&config, &ledger, &statements, &order_only, Nesting::Root));
        let expected = concat!(
            "include /home/make/ninja/linux.ninja\n\n",
            "include /home/make/ninja/rules.ninja\n\n",
            "rule symlink\n",
            "  command = rm -f $out && ln -s $target $out\n",
            "  description = SYMLINK $out\n\n",
            "rule mkdir\n",
            "  command = mkdir -p $out\n",
            "  description = MKDIR $out\n\n",
            "rule install\n",
            "  command = cp -p $in $destination\n",
            "  description = INSTALL $in\n\n",
            "rule deploy\n",
            "  command = make.deploy.ksh $in $directive\n",
            "  description = DEPLOY $in\n\n",
            "build /p/obj/a.o: compile /p/a.cpp || /p/obj\n",
            "  INCLUDE_PATHS_DIRECTIVE = -I /p/include\n\n",
            "build /p/bin/app: linkexecutable /p/obj/a.o | ext || /p/bin\n",
            "  LIBRARY_PATHS_DIRECTIVE = -L /p/bin\n",
            "  libs = -l ext\n\n",
            "build ext: phony\n\n",
            "build /p/obj: mkdir\n\n",
            "build compile: phony /p/obj/a.o\n\n",
            "build link: phony /p/bin/app\n\n",
            "build test: phony\n\n",
            "build install: phony\n\n",
            "build deploy: phony\n\n",
            "build all: phony compile link\n\n",
            "default all\n",
        );
        assert_eq!(text, expected);
    }

    #[rstest]
    fn nested_scope_has_no_aggregates(config: EngineConfig) {
        let mut ledger = BuildState::new();
        ledger.add_pre_build_statement("cflags = -g");
        let library = Target::new(
            "bin/common",
            TargetKind::SharedLibrary,
            "/p/bin/libcommon.so.1.2".into(),
            Some(Version::new(1, 2)),
        );
        let statements = vec![
            Statement::Alias {
                alias: "common".into(),
                target: library.clone(),
            },
            Statement::Subscope(ScopeReference {
                description: "/p/sub/makefile.yml".into(),
                descriptor: "/p/sub/makefile.yml.ninja".into(),
                nesting: Nesting::Independent,
            }),
        ];
        let order_only = OrderOnly::new();
        let text = Ninja.render(&view(
            &config,
            &ledger,
            &statements,
            &order_only,
            Nesting::Independent,
        ));
        assert_eq!(
            text,
            concat!(
                "cflags = -g\n\n",
                "build common: phony /p/bin/libcommon.so\n\n",
                "subninja /p/sub/makefile.yml.ninja\n\n",
            )
        );
    }

    #[rstest]
    fn versioned_library_gets_soname_and_symlinks(config: EngineConfig) {
        let ledger = BuildState::new();
        let statements = vec![Statement::Link(LinkStep {
            target: Target::new(
                "bin/foo",
                TargetKind::SharedLibrary,
                "/p/bin/libfoo.so.2.3".into(),
                Some(Version::new(2, 3)),
            ),
            objects: vec!["/p/obj/foo.o".into()],
            libraries: Vec::new(),
            library_directive: String::new(),
            library_paths: Vec::new(),
            include_directive: None,
            server_directive: None,
            soname_directive: Some("-Wl,-soname,libfoo.so.2".into()),
        })];
        let order_only = OrderOnly::new();
        let text = Ninja.render(&view(
            &config,
            &ledger,
            &statements,
            &order_only,
            Nesting::Independent,
        ));
        assert_eq!(
            text,
            concat!(
                "build /p/bin/libfoo.so.2.3: linklibrary /p/obj/foo.o || /p/bin\n",
                "  SONAME_DIRECTIVE = -Wl,-soname,libfoo.so.2\n\n",
                "build /p/bin/libfoo.so.2: symlink /p/bin/libfoo.so.2.3\n",
                "  target = libfoo.so.2.3\n\n",
                "build /p/bin/libfoo.so: symlink /p/bin/libfoo.so.2\n",
                "  target = libfoo.so.2\n\n",
            )
        );
    }

    #[rstest]
    fn sequential_scopes_use_the_pool(config: EngineConfig) {
        let mut ledger = BuildState::new();
        ledger.set_parallel(false);
        let statements = vec![Statement::Compile(CompileStep {
            source: "/p/a.cpp".into(),
            object: "/p/obj/a.o".into(),
            include_directive: String::new(),
            directive: "-O2".into(),
        })];
        let order_only = OrderOnly::new();
        let mut frame = view(&config, &ledger, &statements, &order_only, Nesting::Root);
        frame.sequential = true;
        let text = Ninja.render(&frame);
        assert!(text.contains("pool sequential\n  depth = 1\n"));
        assert!(text.contains(
            "build /p/obj/a.o: compile /p/a.cpp || /p/obj\n  directive = -O2\n  pool = sequential\n"
        ));
    }

    #[rstest]
    #[case("/p/a b.cpp", "/p/a$ b.cpp")]
    #[case("c:/x", "c$:/x")]
    #[case("$x", "$$x")]
    fn escapes_build_paths(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(escape(raw), expected);
    }
}
