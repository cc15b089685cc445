use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    ChildKind, CustomerDetails, CustomerService, Deadline, InMemoryCustomerStore, NewCustomer,
};

fn bench_create_customer(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = CustomerService::new(InMemoryCustomerStore::new());

    c.bench_function("domain/create_customer", |b| {
        b.iter(|| {
            rt.block_on(async {
                service
                    .create_customer(
                        Deadline::none(),
                        NewCustomer::new("Alice").date_of_birth("2000-01-01"),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_add_email(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = CustomerService::new(InMemoryCustomerStore::new());
    let id = rt.block_on(async {
        service
            .create_customer(Deadline::none(), NewCustomer::new("Alice"))
            .await
            .unwrap()
            .id
    });

    let mut n = 0u64;
    c.bench_function("domain/add_email", |b| {
        b.iter(|| {
            n += 1;
            let email = format!("alice+{n}@x.com");
            rt.block_on(async {
                service
                    .add_email(Deadline::none(), id, &email)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_create_customer_with_details(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = CustomerService::new(InMemoryCustomerStore::new());

    let mut n = 0u64;
    c.bench_function("domain/create_customer_with_details", |b| {
        b.iter(|| {
            n += 1;
            let details = CustomerDetails::new(NewCustomer::new("Dana"))
                .email(format!("dana+{n}@x.com"))
                .phone_number(format!("{n:09}"))
                .address("9 Elm St");
            rt.block_on(async {
                service
                    .create_customer_with_details(Deadline::none(), details)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_get_customer_by_email(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = CustomerService::new(InMemoryCustomerStore::new());

    // Pre-populate: 100 customers with one email each
    rt.block_on(async {
        for v in 0..100 {
            let details = CustomerDetails::new(NewCustomer::new(format!("Customer {v}")))
                .email(format!("customer{v}@x.com"));
            service
                .create_customer_with_details(Deadline::none(), details)
                .await
                .unwrap();
        }
    });

    c.bench_function("domain/get_customer_by_email_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let customer = service
                    .get_customer_by_email(Deadline::none(), "customer99@x.com")
                    .await
                    .unwrap();
                assert_eq!(customer.values(ChildKind::Email).len(), 1);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_customer,
    bench_add_email,
    bench_create_customer_with_details,
    bench_get_customer_by_email,
);
criterion_main!(benches);
