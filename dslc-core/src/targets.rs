//! Static table of generation targets.
//!
//! Each target is plain data: what the compiler produces for it and which
//! local build tool (if any) turns the reconciled sources into an artifact.
//! Lookups are case-insensitive, matching how target names are typed on the
//! command line.

/// Local build step associated with a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTool {
    Javac,
    Csc,
    Scalac,
    /// Sources are used as-is.
    None,
}

impl BuildTool {
    /// Executable name, if the target needs one.
    pub fn program(self) -> Option<&'static str> {
        match self {
            Self::Javac => Some("javac"),
            Self::Csc => Some("csc"),
            Self::Scalac => Some("scalac"),
            Self::None => None,
        }
    }
}

/// One generation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub name: &'static str,
    pub description: &'static str,
    /// Extension of generated sources, when uniform.
    pub extension: Option<&'static str>,
    pub build: BuildTool,
    pub dependencies: &'static [&'static str],
    /// Default artifact produced by the build step.
    pub artifact: Option<&'static str>,
    /// Glob of a generated manifest that is written outside the output tree.
    pub manifest: Option<&'static str>,
}

const DOTNET_CLIENT_DEPENDENCIES: &[&str] = &[
    "System.dll",
    "System.Core.dll",
    "System.Dynamic.dll",
    "System.ComponentModel.Composition.dll",
    "System.Configuration.dll",
    "System.Data.dll",
    "System.Drawing.dll",
    "System.Xml.dll",
    "System.Xml.Linq.dll",
    "System.Runtime.Serialization.dll",
];

const JAVA_MANIFEST: Option<&str> = Some("**/*ava/project.ini");

const TARGETS: &[Target] = &[
    Target {
        name: "revenj.java",
        description: "Revenj.Java server for Postgres",
        extension: Some(".java"),
        build: BuildTool::Javac,
        dependencies: &["revenj-servlet", "revenj-storage"],
        artifact: None,
        manifest: JAVA_MANIFEST,
    },
    Target {
        name: "java_client",
        description: "Java client",
        extension: Some(".java"),
        build: BuildTool::Javac,
        dependencies: &["dsl-client-java"],
        artifact: Some("generated-client-java.jar"),
        manifest: JAVA_MANIFEST,
    },
    Target {
        name: "java_pojo",
        description: "Plain Old Java Object",
        extension: Some(".java"),
        build: BuildTool::Javac,
        dependencies: &[],
        artifact: Some("generated-model-java.jar"),
        manifest: JAVA_MANIFEST,
    },
    Target {
        name: "android",
        description: "Android",
        extension: Some(".java"),
        build: BuildTool::Javac,
        dependencies: &["dsl-client-java"],
        artifact: Some("generated-model-android.jar"),
        manifest: JAVA_MANIFEST,
    },
    Target {
        name: "revenj.net",
        description: "Revenj.NET server for Postgres",
        extension: Some(".cs"),
        build: BuildTool::Csc,
        dependencies: &[],
        artifact: None,
        manifest: None,
    },
    Target {
        name: "dotnet_poco",
        description: "Plain Old C# Object",
        extension: Some(".cs"),
        build: BuildTool::Csc,
        dependencies: DOTNET_CLIENT_DEPENDENCIES,
        artifact: Some("GeneratedModel.dll"),
        manifest: None,
    },
    Target {
        name: "dotnet_client",
        description: ".NET client",
        extension: Some(".cs"),
        build: BuildTool::Csc,
        dependencies: DOTNET_CLIENT_DEPENDENCIES,
        artifact: Some("ClientModel.dll"),
        manifest: None,
    },
    Target {
        name: "scala_client",
        description: "Scala client",
        extension: Some(".scala"),
        build: BuildTool::Scalac,
        dependencies: &["dsl-client-scala_2.11"],
        artifact: Some("generated-model-scala-client.jar"),
        manifest: None,
    },
    Target {
        name: "revenj.scala",
        description: "Revenj.Scala server for Postgres",
        extension: Some(".scala"),
        build: BuildTool::Scalac,
        dependencies: &["revenj-core_2.11"],
        artifact: None,
        manifest: None,
    },
    Target {
        name: "php_client",
        description: "PHP client",
        extension: Some(".php"),
        build: BuildTool::None,
        dependencies: &[],
        artifact: None,
        manifest: None,
    },
    Target {
        name: "typescript",
        description: "Typescript",
        extension: None,
        build: BuildTool::None,
        dependencies: &[],
        artifact: None,
        manifest: None,
    },
    Target {
        name: "html_docs",
        description: "HTML documentation",
        extension: None,
        build: BuildTool::None,
        dependencies: &[],
        artifact: None,
        manifest: None,
    },
];

impl Target {
    /// Every known target, in display order.
    pub fn all() -> &'static [Target] {
        TARGETS
    }

    /// Case-insensitive lookup by name.
    pub fn find(name: &str) -> Option<&'static Target> {
        TARGETS.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}
