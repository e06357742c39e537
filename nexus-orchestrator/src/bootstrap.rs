//! Remote-shell bootstrap run inside a freshly started execution context.

use nexus_provider::ExecOptions;

use crate::request::SshConfig;

/// Script that installs an SSH daemon, installs the user's public key and
/// turns off password logins. `ssh.user` has already been validated as a
/// plain identifier and the key as a single line.
pub fn ssh_setup_script(ssh: &SshConfig) -> String {
    let user = &ssh.user;
    let key = ssh.pub_key.trim();
    format!(
        r#"#!/bin/bash
set -e

export DEBIAN_FRONTEND=noninteractive
apt-get update -qq
apt-get install -y -qq openssh-server net-tools > /dev/null 2>&1

id -u {user} > /dev/null 2>&1 || useradd -m -s /bin/bash {user}

mkdir -p /home/{user}/.ssh
chmod 700 /home/{user}/.ssh
cat > /home/{user}/.ssh/authorized_keys <<'NEXUS_AUTHORIZED_KEY'
{key}
NEXUS_AUTHORIZED_KEY
chmod 600 /home/{user}/.ssh/authorized_keys
chown -R {user}:{user} /home/{user}/.ssh

mkdir -p /run/sshd
sed -i 's/^#\?PermitRootLogin.*/PermitRootLogin no/' /etc/ssh/sshd_config
sed -i 's/^#\?PubkeyAuthentication.*/PubkeyAuthentication yes/' /etc/ssh/sshd_config
sed -i 's/^#\?PasswordAuthentication.*/PasswordAuthentication no/' /etc/ssh/sshd_config

service ssh start || /usr/sbin/sshd
echo "SSH configured"
"#
    )
}

pub fn ssh_setup_command(ssh: &SshConfig) -> ExecOptions {
    ExecOptions::shell(ssh_setup_script(ssh)).capture_output()
}

/// Lists listening sockets; only used to confirm sshd came up.
pub fn listening_ports_command() -> ExecOptions {
    ExecOptions::new(["netstat", "-tlnp"]).capture_output()
}
