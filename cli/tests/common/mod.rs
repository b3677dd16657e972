use std::io::Write;
use std::path::{Path, PathBuf};

use nodeup_cli::commands::cli::Args;
use nodeup_core::api::OutputSink;

/// A cluster state directory plus a mounted image root, laid out on disk.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new(cluster_yaml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let root = dir.path().join("root");

        write(&root.join("etc/os-release"), "ID=flatcar\nNAME=\"Flatcar Container Linux\"\n");
        write(&state.join("secrets/.keep"), "");
        write(
            &state.join("pki/ca.crt"),
            "-----BEGIN CERTIFICATE-----\nMIIBfixture\n-----END CERTIFICATE-----\n",
        );

        let cluster = format!(
            "secretStore: {}\nkeyStore: {}\ncontainerRuntime: containerd\n{cluster_yaml}",
            state.join("secrets").display(),
            state.join("pki").display(),
        );
        write(&state.join("cluster-completed.spec"), &cluster);
        write(
            &state.join("instancegroup/nodes"),
            "name: nodes\nrole: Node\nsysctlParameters:\n  - vm.swappiness = 0\n",
        );
        write(
            &dir.path().join("node.yaml"),
            &format!("configBase: {}\ninstanceGroupName: nodes\n", state.display()),
        );

        Self { dir }
    }

    pub fn args(&self, target: &str) -> Args {
        Args {
            conf: Some(self.dir.path().join("node.yaml").display().to_string()),
            cache_dir: PathBuf::from("/var/cache/nodeup"),
            fs_root: self.dir.path().join("root"),
            target: Some(target.to_string()),
            out: None,
            app_config: None,
        }
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Output opener for `node_up` that hands back `writer`.
pub fn output<W>(writer: W) -> impl FnOnce() -> std::io::Result<OutputSink>
where
    W: Write + Send + 'static,
{
    move || Ok(Box::new(writer) as OutputSink)
}
