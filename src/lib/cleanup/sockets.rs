//! Finds the processes holding a listening TCP socket on a given port.
//!
//! Linux only: the kernel's socket tables in `/proc/net/tcp{,6}` map the
//! port to socket inodes, and `/proc/<pid>/fd` maps inodes to owners.
//! Elsewhere no owner is ever reported.

use std::collections::HashSet;

const TCP_LISTEN: &str = "0A";

/// Inodes of sockets listening on `port` in one `/proc/net/tcp*` table.
pub fn listening_inodes(table: &str, port: u16) -> HashSet<u64> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let local = fields.get(1)?;
            let state = fields.get(3)?;
            let inode = fields.get(9)?;

            let (_, local_port) = local.rsplit_once(':')?;
            let local_port = u16::from_str_radix(local_port, 16).ok()?;
            if local_port != port || *state != TCP_LISTEN {
                return None;
            }
            inode.parse().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Inode from an fd link target such as `socket:[12345]`.
pub fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

#[cfg(target_os = "linux")]
pub fn port_owners(port: u16) -> HashSet<u32> {
    use std::fs;

    let inodes: HashSet<u64> = ["/proc/net/tcp", "/proc/net/tcp6"]
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .flat_map(|table| listening_inodes(&table, port))
        .collect();
    if inodes.is_empty() {
        return HashSet::new();
    }

    let Ok(procs) = fs::read_dir("/proc") else {
        return HashSet::new();
    };

    procs
        .flatten()
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            // processes we may not inspect are skipped
            let fds = fs::read_dir(entry.path().join("fd")).ok()?;
            fds.flatten()
                .filter_map(|fd| fs::read_link(fd.path()).ok())
                .filter_map(|link| socket_inode(&link.to_string_lossy()))
                .any(|inode| inodes.contains(&inode))
                .then_some(pid)
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
pub fn port_owners(_port: u16) -> HashSet<u32> {
    HashSet::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:25DF 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 48213 1 0000000000000000 100 0 0 10 0
   1: 0100007F:25DF 0100007F:D2C4 01 00000000:00000000 00:00000000 00000000  1000        0 48890 1 0000000000000000 20 4 30 10 -1
   2: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 17001 1 0000000000000000 100 0 0 10 0
";

    #[test]
    fn only_listeners_on_the_port_are_picked() {
        // 0x25DF = 9695, 0x1F90 = 8080
        assert_eq!(listening_inodes(TABLE, 9695), HashSet::from([48213]));
        assert_eq!(listening_inodes(TABLE, 8080), HashSet::from([17001]));
        assert!(listening_inodes(TABLE, 9696).is_empty());
    }

    #[test]
    fn ipv6_local_addresses_parse() {
        let table = "header\n   0: 00000000000000000000000001000000:25DF 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 77 1\n";
        assert_eq!(listening_inodes(table, 9695), HashSet::from([77]));
    }

    #[test]
    fn fd_links_yield_socket_inodes() {
        assert_eq!(socket_inode("socket:[48213]"), Some(48213));
        assert_eq!(socket_inode("pipe:[48213]"), None);
        assert_eq!(socket_inode("/dev/null"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_listener_is_found() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_owners(port).contains(&std::process::id()));
    }
}
