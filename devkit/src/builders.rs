/*!
Constructeurs de descripteurs pour les tests : instances cloud, noeuds de
gestion de configuration, serveurs monitoring.
*/

use fleet_kernel::models::{AutomaticAttributes, Ec2Attributes, InstanceDescriptor, NodeDescriptor, ServerDescriptor};
use time::OffsetDateTime;

/// Instance `running` ; `hostname` devient le premier label du nom DNS privé
pub fn running_instance(id: &str, ip: &str, hostname: &str) -> InstanceDescriptor {
    InstanceDescriptor {
        id: id.to_string(),
        state: "running".to_string(),
        private_ip: Some(ip.to_string()),
        private_dns_name: Some(format!("{hostname}.us-west-1.compute.internal")),
    }
}

pub fn terminated_instance(id: &str) -> InstanceDescriptor {
    InstanceDescriptor {
        id: id.to_string(),
        state: "terminated".to_string(),
        private_ip: None,
        private_dns_name: Some(String::new()),
    }
}

pub fn node(name: &str, environment: &str) -> NodeBuilder {
    NodeBuilder {
        node: NodeDescriptor {
            name: name.to_string(),
            environment: environment.to_string(),
            run_list: Vec::new(),
            automatic: AutomaticAttributes::default(),
        },
    }
}

pub struct NodeBuilder {
    node: NodeDescriptor,
}

impl NodeBuilder {
    pub fn ip(mut self, ip: &str) -> Self {
        self.node.automatic.ipaddress = Some(ip.to_string());
        self
    }

    pub fn hostname(mut self, hostname: &str) -> Self {
        self.node.automatic.hostname = Some(hostname.to_string());
        self
    }

    pub fn checked_in(mut self, at: OffsetDateTime) -> Self {
        self.node.automatic.ohai_time = Some(at.unix_timestamp() as f64);
        self
    }

    pub fn instance_id(mut self, instance_id: &str) -> Self {
        self.node.automatic.ec2 = Some(Ec2Attributes {
            instance_id: Some(instance_id.to_string()),
        });
        self
    }

    pub fn run_list(mut self, entries: &[&str]) -> Self {
        self.node.run_list = entries.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn build(self) -> NodeDescriptor {
        self.node
    }
}

/// Serveur qui reporte, sans date de dernier report
pub fn server(id: u64, host: &str) -> ServerBuilder {
    ServerBuilder {
        server: ServerDescriptor {
            id,
            account_id: 1,
            name: host.to_string(),
            host: Some(host.to_string()),
            reporting: true,
            last_reported_at: None,
        },
    }
}

pub struct ServerBuilder {
    server: ServerDescriptor,
}

impl ServerBuilder {
    pub fn reporting(mut self, reporting: bool) -> Self {
        self.server.reporting = reporting;
        self
    }

    pub fn last_reported(mut self, at: OffsetDateTime) -> Self {
        self.server.last_reported_at = Some(at);
        self
    }

    pub fn without_host(mut self) -> Self {
        self.server.host = None;
        self
    }

    pub fn build(self) -> ServerDescriptor {
        self.server
    }
}
