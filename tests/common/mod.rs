//! Shared fixtures: fake toolchains and scaffolded extension projects.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use aix_builder::BuilderConfig;

pub const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project name="Widget" default="package">
  <property name="src.dir" value="src"/>
  <property name="build.dir" value="build"/>
  <property name="dist.dir" value="dist"/>
  <property name="lib.dir" value="lib"/>

  <target name="clean">
    <delete dir="${build.dir}"/>
    <delete dir="${dist.dir}"/>
  </target>

  <target name="compile">
    <javac srcdir="${src.dir}" destdir="${build.dir}/classes"
           source="1.8" target="1.8" encoding="UTF-8"/>
  </target>

  <target name="package" depends="compile"/>
  <target name="package-optimized" depends="compile"/>
  <target name="package-signed" depends="package"/>
  <target name="test-coverage" depends="compile"/>
</project>
"#;

pub const COMPONENT_SOURCE: &str = r#"package com.example;

import com.google.appinventor.components.annotations.DesignerComponent;
import com.google.appinventor.components.annotations.SimpleFunction;
import com.google.appinventor.components.annotations.SimpleObject;

@DesignerComponent(version = 1, description = "Demo widget")
@SimpleObject(external = true)
public class Widget extends AndroidNonvisibleComponent {
    public Widget(ComponentContainer container) {
        super(container.$form());
    }

    @SimpleFunction(description = "Add two numbers")
    public int Add(int a, int b) {
        return a + b;
    }
}
"#;

/// Ant stand-in. Records each invocation in `.invocations` and produces
/// `dist/com.example.Widget.aix` for the packaging targets.
pub const FAKE_ANT: &str = r#"if [ "$1" = "-version" ]; then
  echo "Apache Ant(TM) version 1.10.12 compiled on October 13 2021"
  exit 0
fi
echo "Buildfile: $PWD/build.xml"
target="$1"
echo "$*" >> "$PWD/.invocations"
case "$target" in
  clean)
    rm -rf build dist
    ;;
  compile)
    mkdir -p build/classes
    echo "    [javac] Compiling 2 source files to $PWD/build/classes"
    ;;
  package|package-optimized|package-signed)
    mkdir -p build/classes dist
    echo "    [javac] Compiling 2 source files to $PWD/build/classes"
    printf 'PK' > dist/com.example.Widget.aix
    echo "      [zip] Building zip: $PWD/dist/com.example.Widget.aix"
    echo "     [echo] Extension built: $PWD/dist/com.example.Widget.aix"
    ;;
  test-coverage)
    echo "    [junit] Tests run: 3, Failures: 0, Errors: 0"
    ;;
  *)
    echo "Target \"$target\" does not exist in the project \"Widget\"." >&2
    echo "BUILD FAILED" >&2
    exit 1
    ;;
esac
echo "BUILD SUCCESSFUL""#;

pub const FAKE_JAVA: &str = r#"echo 'openjdk version "17.0.2" 2022-01-18' >&2
echo 'OpenJDK Runtime Environment (build 17.0.2+8-86)' >&2"#;

/// Write an executable `#!/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Config using the fake ant and java in `tools`; kotlinc is left unavailable.
pub fn fake_config(tools: &Path) -> BuilderConfig {
    BuilderConfig {
        toolchain_command: write_script(tools, "ant", FAKE_ANT).to_string_lossy().into_owned(),
        java_command: write_script(tools, "java", FAKE_JAVA).to_string_lossy().into_owned(),
        kotlin_command: tools.join("kotlinc-missing").to_string_lossy().into_owned(),
        build_timeout_ms: 30_000,
        ..BuilderConfig::default()
    }
}

/// A complete, valid extension project.
pub fn scaffold_project(root: &Path) {
    fs::write(root.join("build.xml"), DESCRIPTOR).unwrap();

    let package = root.join("src").join("com").join("example");
    fs::create_dir_all(&package).unwrap();
    fs::write(package.join("Widget.java"), COMPONENT_SOURCE).unwrap();

    fs::create_dir_all(root.join("assets")).unwrap();

    let lib = root.join("lib");
    fs::create_dir_all(&lib).unwrap();
    for jar in ["appinventor-components.jar", "android.jar", "kawa.jar"] {
        fs::write(lib.join(jar), b"PK\x03\x04").unwrap();
    }
}

/// Lines the fake ant appended to `.invocations`.
pub fn invocations(project: &Path) -> Vec<String> {
    fs::read_to_string(project.join(".invocations"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Whether `pid` names a live (non-zombie) process.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // Field 3 is the state; the command name in field 2 may contain spaces.
        Ok(stat) => match stat.rfind(')') {
            Some(end) => !stat[end + 1..].trim_start().starts_with('Z'),
            None => true,
        },
        Err(_) => false,
    }
}
