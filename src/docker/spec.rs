use crate::db::ResourceQuota;

const CPU_PERIOD: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: String,
    pub container: String,
    pub read_only: bool,
}

impl BindMount {
    fn to_arg(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.host, self.container, mode)
    }
}

/// Everything needed to create a VPS container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub network: String,
    pub memory_gb: u32,
    pub cpus: u32,
    pub privileged: bool,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub mounts: Vec<BindMount>,
    pub env: Vec<(String, String)>,
    pub restart_policy: String,
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// The VM-like container shape: elevated capabilities, cgroup and runtime
    /// socket mounts, memory ceiling without extra swap, and a CPU quota of
    /// `cpus` full periods.
    pub fn for_vps(
        name: &str,
        image: &str,
        hostname: &str,
        network: &str,
        quota: &ResourceQuota,
        boot_init_system: bool,
    ) -> Self {
        let command = if boot_init_system {
            vec![
                "bash".to_string(),
                "-c".to_string(),
                "apt-get update && apt-get install -y systemd-sysv && exec /lib/systemd/systemd"
                    .to_string(),
            ]
        } else {
            vec!["sleep".to_string(), "infinity".to_string()]
        };

        Self {
            name: name.to_string(),
            image: image.to_string(),
            hostname: hostname.to_string(),
            network: network.to_string(),
            memory_gb: quota.ram,
            cpus: quota.cpu,
            privileged: true,
            cap_add: vec!["ALL".to_string()],
            security_opt: vec!["seccomp=unconfined".to_string()],
            mounts: vec![
                BindMount {
                    host: "/sys/fs/cgroup".to_string(),
                    container: "/sys/fs/cgroup".to_string(),
                    read_only: true,
                },
                BindMount {
                    host: "/var/run/docker.sock".to_string(),
                    container: "/var/run/docker.sock".to_string(),
                    read_only: false,
                },
            ],
            env: vec![("container".to_string(), "docker".to_string())],
            restart_policy: "unless-stopped".to_string(),
            command,
        }
    }

    /// Arguments for `docker run`, without the program name.
    pub fn to_run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--hostname".to_string(),
            self.hostname.clone(),
            "--network".to_string(),
            self.network.clone(),
            format!("--memory={}g", self.memory_gb),
            format!("--memory-swap={}g", self.memory_gb),
            format!("--cpu-period={CPU_PERIOD}"),
            format!("--cpu-quota={}", u64::from(self.cpus) * CPU_PERIOD),
            format!("--restart={}", self.restart_policy),
        ];
        if self.privileged {
            args.push("--privileged".to_string());
        }
        for cap in &self.cap_add {
            args.push(format!("--cap-add={cap}"));
        }
        for opt in &self.security_opt {
            args.push("--security-opt".to_string());
            args.push(opt.clone());
        }
        for mount in &self.mounts {
            args.push("-v".to_string());
            args.push(mount.to_arg());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}
